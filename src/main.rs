mod collectors;
mod config;
mod render;
mod scheduler;
mod serial;
mod weather;

use clap::Parser;
use config::{Config, FanPreference};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "paneld")]
#[command(version)]
struct Cli {
    /// Serial device path, overrides PANELD_SERIAL_PORT
    #[arg(long)]
    serial_port: Option<String>,
    /// Preferred fan RPM source, overrides PANELD_FAN_PREFER
    #[arg(long, value_enum)]
    fan_prefer: Option<FanPreference>,
    /// Fan RPM ceiling, overrides PANELD_FAN_MAX_RPM
    #[arg(long)]
    fan_max_rpm: Option<u32>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = Config::load();
    if let Some(port) = cli.serial_port {
        cfg.serial_port = Some(port);
    }
    if let Some(prefer) = cli.fan_prefer {
        cfg.fan_prefer = prefer;
    }
    if let Some(ceiling) = cli.fan_max_rpm {
        cfg.fan_max_rpm = ceiling;
    }

    info!(
        serial_port = cfg.serial_port.as_deref().unwrap_or("auto-detect"),
        baud = cfg.baud,
        location = %cfg.location,
        weather_refresh_secs = cfg.weather_refresh.as_secs(),
        fan_prefer = ?cfg.fan_prefer,
        fan_max_rpm = cfg.fan_max_rpm,
        weather_key = cfg.api_key.is_some(),
        "starting paneld"
    );

    scheduler::run(cfg).await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
