use crate::collectors::{FanReading, FanSource};
use crate::config::FanPreference;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const HWMON_ROOT: &str = "/sys/class/hwmon";
const SMI_TIMEOUT: Duration = Duration::from_secs(2);

/// Reads the fan RPM from the preferred source, falling back to the other
/// one when the preferred source has nothing to report. Returns `None`
/// when no source yields a reading.
pub async fn read_fan(prefer: FanPreference, max_rpm: u32) -> Option<FanReading> {
    let attempts: [FanSource; 2] = match prefer {
        FanPreference::Nvidia => [FanSource::Nvidia, FanSource::Hwmon],
        FanPreference::Auto | FanPreference::Hwmon => [FanSource::Hwmon, FanSource::Nvidia],
    };

    for source in attempts {
        let rpm = match source {
            FanSource::Hwmon => hwmon_max_rpm(Path::new(HWMON_ROOT)),
            FanSource::Nvidia => nvidia_fan_rpm(max_rpm).await,
        };
        if let Some(rpm) = rpm {
            return Some(normalize(rpm, max_rpm, source));
        }
    }
    None
}

/// Clamps readings above the configured ceiling instead of passing a
/// tachometer glitch through to the panel.
pub(crate) fn normalize(rpm: u32, ceiling: u32, source: FanSource) -> FanReading {
    if ceiling > 0 && rpm > ceiling {
        FanReading {
            rpm: ceiling,
            clamped: true,
            source,
        }
    } else {
        FanReading {
            rpm,
            clamped: false,
            source,
        }
    }
}

/// Highest positive `fan*_input` reading across all hwmon chips. The scan
/// root is a parameter so tests can point it at a temporary tree.
pub(crate) fn hwmon_max_rpm(root: &Path) -> Option<u32> {
    let chips = fs::read_dir(root).ok()?;
    let mut best: Option<u32> = None;
    for chip in chips.flatten() {
        let Ok(files) = fs::read_dir(chip.path()) else {
            continue;
        };
        for file in files.flatten() {
            let name = file.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("fan") || !name.ends_with("_input") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(file.path()) else {
                continue;
            };
            if let Ok(rpm) = raw.trim().parse::<u32>() {
                if rpm > 0 {
                    best = Some(best.map_or(rpm, |b| b.max(rpm)));
                }
            }
        }
    }
    best
}

/// NVIDIA reports fan speed as a percentage; scale it by the configured
/// ceiling to approximate RPM.
async fn nvidia_fan_rpm(max_rpm: u32) -> Option<u32> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=fan.speed", "--format=csv,noheader,nounits"])
        .output();
    let output = match timeout(SMI_TIMEOUT, output).await {
        Ok(Ok(out)) => out,
        Ok(Err(err)) => {
            debug!(error = %err, "nvidia-smi not available for fan speed");
            return None;
        }
        Err(_) => {
            debug!("nvidia-smi fan query timed out");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let percent: f64 = stdout.lines().next()?.trim().parse().ok()?;
    Some((percent / 100.0 * f64::from(max_rpm.max(1))).round() as u32)
}
