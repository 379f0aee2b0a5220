use crate::config::{Config, Location, Units};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const OWM_CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FETCH_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("no API key configured")]
    NoApiKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub description: String,
    /// Resolved location name echoed by the provider.
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherStatus {
    Online,
    Offline,
}

/// Last-known weather state. A failed fetch flips `status` to Offline but
/// never touches `current`: the panel keeps showing the cached reading,
/// marked stale, instead of going blank.
#[derive(Debug, Clone)]
pub struct WeatherSnapshot {
    pub status: WeatherStatus,
    pub current: Option<CurrentConditions>,
    /// Unix time of the last successful fetch.
    pub fetched_at_unix: i64,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            status: WeatherStatus::Offline,
            current: None,
            fetched_at_unix: 0,
        }
    }
}

impl WeatherSnapshot {
    pub fn apply(&mut self, outcome: Result<CurrentConditions, WeatherError>, now_unix: i64) {
        match outcome {
            Ok(conditions) => {
                self.current = Some(conditions);
                self.status = WeatherStatus::Online;
                self.fetched_at_unix = now_unix;
            }
            Err(_) => {
                self.status = WeatherStatus::Offline;
            }
        }
    }
}

#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    api_key: Option<String>,
    location: Location,
    units: Units,
    lang: String,
}

impl WeatherClient {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            client,
            api_key: cfg.api_key.clone(),
            location: cfg.location.clone(),
            units: cfg.units,
            lang: cfg.lang.clone(),
        }
    }

    /// One bounded fetch of current conditions. Without an API key this
    /// returns before any network I/O. No retries here: the next scheduled
    /// refresh is the retry.
    pub async fn refresh(&self) -> Result<CurrentConditions, WeatherError> {
        let key = self.api_key.as_deref().ok_or(WeatherError::NoApiKey)?;

        let mut request = self
            .client
            .get(OWM_CURRENT_URL)
            .timeout(FETCH_TIMEOUT)
            .query(&[
                ("units", self.units.as_owm_param()),
                ("lang", self.lang.as_str()),
                ("appid", key),
            ]);
        request = match &self.location {
            Location::Coords { lat, lon } => request.query(&[
                ("lat", format!("{lat:.6}")),
                ("lon", format!("{lon:.6}")),
            ]),
            Location::Place(name) => request.query(&[("q", name.clone())]),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }
        let body: OwmResponse = response
            .json()
            .await
            .map_err(|err| WeatherError::Payload(err.to_string()))?;
        parse_conditions(body, &self.location)
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: OwmMain,
    weather: Vec<OwmCondition>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
}

fn parse_conditions(
    body: OwmResponse,
    configured: &Location,
) -> Result<CurrentConditions, WeatherError> {
    let description = body
        .weather
        .first()
        .map(|c| c.description.clone())
        .ok_or_else(|| WeatherError::Payload("missing condition entry".to_string()))?;
    let location = if body.name.is_empty() {
        configured.to_string()
    } else {
        body.name
    };
    Ok(CurrentConditions {
        temperature: body.main.temp,
        description,
        location,
    })
}
