use clap::ValueEnum;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_LOCATION: &str = "51.7687,19.4570";
const DEFAULT_UNITS: Units = Units::Metric;
const DEFAULT_LANG: &str = "en";
const DEFAULT_WEATHER_REFRESH_SECS: u64 = 600;
const DEFAULT_SENSOR_INTERVAL_SECS: u64 = 2;
const DEFAULT_DISPLAY_INTERVAL_SECS: u64 = 1;
const DEFAULT_FAN_MAX_RPM: u32 = 5000;

/// Immutable runtime configuration, read once from the environment at
/// startup. Every field has a default; a bad value degrades to it with a
/// warning instead of aborting the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial_port: Option<String>,
    pub baud: u32,
    pub api_key: Option<String>,
    pub location: Location,
    pub units: Units,
    pub lang: String,
    pub weather_refresh: Duration,
    pub sensor_interval: Duration,
    pub display_interval: Duration,
    pub fan_prefer: FanPreference,
    pub fan_max_rpm: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Coords { lat: f64, lon: f64 },
    Place(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Coords { lat, lon } => write!(f, "{lat:.4},{lon:.4}"),
            Location::Place(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Metric,
    Imperial,
}

impl Units {
    pub fn as_owm_param(self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FanPreference {
    Auto,
    Hwmon,
    Nvidia,
}

impl FromStr for FanPreference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(FanPreference::Auto),
            "hwmon" => Ok(FanPreference::Hwmon),
            "nvidia" => Ok(FanPreference::Nvidia),
            _ => Err(()),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup so tests do not
    /// have to mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let serial_port = get("PANELD_SERIAL_PORT");
        let baud = get("PANELD_BAUD")
            .map(|v| parse_baud(&v))
            .unwrap_or(DEFAULT_BAUD);
        let api_key = get("PANELD_OWM_API_KEY");
        let location = parse_location(
            get("PANELD_OWM_LOCATION")
                .as_deref()
                .unwrap_or(DEFAULT_LOCATION),
        );
        let units = get("PANELD_OWM_UNITS")
            .map(|v| parse_units(&v))
            .unwrap_or(DEFAULT_UNITS);
        let lang = get("PANELD_OWM_LANG").unwrap_or_else(|| DEFAULT_LANG.to_string());
        let weather_refresh = Duration::from_secs(parse_positive_secs(
            "PANELD_WEATHER_REFRESH_SECS",
            get("PANELD_WEATHER_REFRESH_SECS").as_deref(),
            DEFAULT_WEATHER_REFRESH_SECS,
        ));
        let sensor_interval = Duration::from_secs(parse_positive_secs(
            "PANELD_SENSOR_INTERVAL_SECS",
            get("PANELD_SENSOR_INTERVAL_SECS").as_deref(),
            DEFAULT_SENSOR_INTERVAL_SECS,
        ));
        let display_interval = Duration::from_secs(parse_positive_secs(
            "PANELD_DISPLAY_INTERVAL_SECS",
            get("PANELD_DISPLAY_INTERVAL_SECS").as_deref(),
            DEFAULT_DISPLAY_INTERVAL_SECS,
        ));
        let fan_prefer = get("PANELD_FAN_PREFER")
            .map(|v| {
                <FanPreference as FromStr>::from_str(&v).unwrap_or_else(|_| {
                    warn!(value = %v, "unrecognized PANELD_FAN_PREFER, using auto");
                    FanPreference::Auto
                })
            })
            .unwrap_or(FanPreference::Auto);
        let fan_max_rpm = get("PANELD_FAN_MAX_RPM")
            .map(|v| match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(value = %v, "invalid PANELD_FAN_MAX_RPM, using {DEFAULT_FAN_MAX_RPM}");
                    DEFAULT_FAN_MAX_RPM
                }
            })
            .unwrap_or(DEFAULT_FAN_MAX_RPM);

        Config {
            serial_port,
            baud,
            api_key,
            location,
            units,
            lang,
            weather_refresh,
            sensor_interval,
            display_interval,
            fan_prefer,
            fan_max_rpm,
        }
    }
}

/// Accepts either a `lat,lon` pair of two floats or a free-text place
/// identifier. A pair that does not parse as two numbers is treated as a
/// place name, not rejected.
pub fn parse_location(raw: &str) -> Location {
    let s = raw.trim();
    if let Some((a, b)) = s.split_once(',') {
        if let (Ok(lat), Ok(lon)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            return Location::Coords { lat, lon };
        }
    }
    Location::Place(s.to_string())
}

fn parse_baud(raw: &str) -> u32 {
    // 115120 is a known typo for 115200 seen in deployed unit files.
    if raw == "115120" {
        warn!("PANELD_BAUD 115120 corrected to 115200");
        return DEFAULT_BAUD;
    }
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!(value = %raw, "invalid PANELD_BAUD, using {DEFAULT_BAUD}");
            DEFAULT_BAUD
        }
    }
}

fn parse_units(raw: &str) -> Units {
    match raw.to_ascii_lowercase().as_str() {
        "metric" => Units::Metric,
        "imperial" => Units::Imperial,
        other => {
            warn!(value = %other, "unrecognized PANELD_OWM_UNITS, using metric");
            Units::Metric
        }
    }
}

fn parse_positive_secs(name: &str, raw: Option<&str>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(v) => match v.parse::<i64>() {
            Ok(n) if n > 0 => n as u64,
            _ => {
                warn!(var = name, value = %v, "expected a positive integer, using {default}");
                default
            }
        },
    }
}
