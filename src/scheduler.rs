use crate::collectors::{self, SensorSnapshot};
use crate::config::Config;
use crate::render;
use crate::serial::{LinkOpener, SerialOpener, SerialTransport};
use crate::weather::{CurrentConditions, WeatherClient, WeatherError, WeatherSnapshot, WeatherStatus};
use reqwest::Client;
use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{System, SystemExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
            DaemonState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Daemon main loop: spawns the three periodic tasks on independent
/// timers, waits for a termination signal, then stops them within a
/// bounded grace period.
pub async fn run(cfg: Config) {
    info!(state = %DaemonState::Starting, "daemon state");

    let (sensor_tx, sensor_rx) = watch::channel(SensorSnapshot::default());
    let (weather_tx, weather_rx) = watch::channel(WeatherSnapshot::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = Client::builder()
        .user_agent(concat!("paneld/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new());
    let weather_client = WeatherClient::new(&cfg, client);

    let sensor_task = {
        let cfg = cfg.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut system = System::new_all();
            let mut ticker = tokio::time::interval(cfg.sensor_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let snapshot = collectors::collect(&cfg, &mut system, now_unix()).await;
                        sensor_tx.send_replace(snapshot);
                    }
                }
            }
        })
    };

    let weather_task = {
        let period = cfg.weather_refresh;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            weather_loop(
                period,
                move || {
                    let client = weather_client.clone();
                    async move { client.refresh().await }
                },
                weather_tx,
                shutdown,
            )
            .await;
        })
    };

    let display_task = {
        let transport = SerialTransport::new(SerialOpener::new(cfg.serial_port.clone(), cfg.baud));
        let shutdown = shutdown_rx.clone();
        let period = cfg.display_interval;
        tokio::spawn(async move {
            display_loop(period, transport, sensor_rx, weather_rx, shutdown).await;
        })
    };

    info!(state = %DaemonState::Running, "daemon state");
    wait_for_shutdown().await;

    info!(state = %DaemonState::Stopping, "daemon state");
    let _ = shutdown_tx.send(true);
    for mut task in [sensor_task, weather_task, display_task] {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("task did not stop within grace period, aborting");
            task.abort();
        }
    }
    info!(state = %DaemonState::Stopped, "daemon state");
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = term.recv() => info!("received SIGTERM"),
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, SIGINT only");
            let _ = ctrl_c.await;
            info!("received SIGINT");
        }
    }
}

/// Periodic weather refresh on its own, typically much longer, interval.
/// A failed fetch flips the shared snapshot offline without touching its
/// cached values; the snapshot is published as a whole-record replace.
pub async fn weather_loop<F, Fut>(
    period: Duration,
    mut fetch: F,
    tx: watch::Sender<WeatherSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<CurrentConditions, WeatherError>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let outcome = fetch().await;
                let now = now_unix();
                let mut snapshot = tx.borrow().clone();
                let previous = snapshot.status;
                if let Err(err) = &outcome {
                    if previous == WeatherStatus::Online {
                        let age = now.saturating_sub(snapshot.fetched_at_unix).max(0) as u64;
                        warn!(
                            error = %err,
                            stale_for = %humantime::format_duration(Duration::from_secs(age)),
                            "weather source went offline, keeping cached reading"
                        );
                    }
                }
                snapshot.apply(outcome, now);
                if previous == WeatherStatus::Offline && snapshot.status == WeatherStatus::Online {
                    info!("weather source back online");
                }
                tx.send_replace(snapshot);
            }
        }
    }
}

/// Periodic frame render and delivery. Always reads the latest completed
/// snapshots, regardless of which source updated last.
pub async fn display_loop<O: LinkOpener>(
    period: Duration,
    mut transport: SerialTransport<O>,
    sensor_rx: watch::Receiver<SensorSnapshot>,
    weather_rx: watch::Receiver<WeatherSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let frame = {
                    let sensor = sensor_rx.borrow();
                    let weather = weather_rx.borrow();
                    render::render(&sensor, &weather)
                };
                if let Err(err) = transport.send(&frame.encode()).await {
                    warn!(error = %err, "frame delivery failed, retrying on next tick");
                }
            }
        }
    }
    transport.close().await;
}
