use crate::collectors::GpuReading;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const SMI_TIMEOUT: Duration = Duration::from_secs(2);
const DRM_DEVICE: &str = "/sys/class/drm/card0/device";

/// Reads GPU name, temperature and utilization. Tries `nvidia-smi` first,
/// then falls back to the generic DRM sysfs tree (amdgpu exposes
/// `gpu_busy_percent` and an hwmon temperature there).
pub async fn read_gpu() -> Option<GpuReading> {
    if let Some(reading) = read_nvidia().await {
        return Some(reading);
    }
    read_drm_sysfs(Path::new(DRM_DEVICE)).await
}

async fn read_nvidia() -> Option<GpuReading> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,temperature.gpu,utilization.gpu",
            "--format=csv,noheader,nounits",
        ])
        .output();
    let output = match timeout(SMI_TIMEOUT, output).await {
        Ok(Ok(out)) => out,
        Ok(Err(err)) => {
            debug!(error = %err, "nvidia-smi not available");
            return None;
        }
        Err(_) => {
            debug!("nvidia-smi timed out");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_nvidia_line(stdout.lines().next()?)
}

fn parse_nvidia_line(line: &str) -> Option<GpuReading> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        debug!(line, "malformed nvidia-smi line");
        return None;
    }
    Some(GpuReading {
        name: clean_gpu_name(parts[0]),
        temperature_c: parts[1].parse().ok()?,
        utilization_percent: parts[2].parse().ok()?,
    })
}

async fn read_drm_sysfs(device: &Path) -> Option<GpuReading> {
    let name = read_trimmed(&device.join("product_name"))
        .await
        .filter(|s| !s.is_empty());
    let utilization = read_trimmed(&device.join("gpu_busy_percent"))
        .await
        .and_then(|s| s.parse::<f64>().ok());
    let temperature = drm_hwmon_temp(device).await;

    if name.is_none() && utilization.is_none() && temperature.is_none() {
        return None;
    }
    Some(GpuReading {
        name: clean_gpu_name(name.as_deref().unwrap_or("GPU")),
        temperature_c: temperature.unwrap_or(0.0),
        utilization_percent: utilization.unwrap_or(0.0),
    })
}

async fn drm_hwmon_temp(device: &Path) -> Option<f64> {
    let mut dir = tokio::fs::read_dir(device.join("hwmon")).await.ok()?;
    while let Ok(Some(entry)) = dir.next_entry().await {
        if let Some(raw) = read_trimmed(&entry.path().join("temp1_input")).await {
            if let Ok(millis) = raw.parse::<i64>() {
                return Some(millis as f64 / 1000.0);
            }
        }
    }
    None
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

/// Strips vendor boilerplate so the panel shows a short model name.
pub(crate) fn clean_gpu_name(raw: &str) -> String {
    let mut s = raw.to_string();
    for noise in [
        "(R)",
        "(TM)",
        "NVIDIA Corporation",
        "Advanced Micro Devices, Inc.",
        "Advanced Micro Devices Inc.",
        "Intel(R)",
    ] {
        s = s.replace(noise, " ");
    }
    let cleaned = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        "GPU".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nvidia_csv_line() {
        let reading = parse_nvidia_line("NVIDIA GeForce RTX 4060, 54, 17").unwrap();
        assert_eq!(reading.name, "GeForce RTX 4060");
        assert_eq!(reading.temperature_c, 54.0);
        assert_eq!(reading.utilization_percent, 17.0);
    }

    #[test]
    fn rejects_short_nvidia_line() {
        assert!(parse_nvidia_line("GeForce, 54").is_none());
        assert!(parse_nvidia_line("").is_none());
    }

    #[test]
    fn cleans_vendor_noise_from_name() {
        assert_eq!(
            clean_gpu_name("Intel(R) Arc(TM) A750 Graphics"),
            "Arc A750 Graphics"
        );
        assert_eq!(clean_gpu_name("NVIDIA Corporation  "), "GPU");
    }

    #[tokio::test]
    async fn drm_fallback_reads_fake_sysfs_tree() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("device");
        let hwmon = device.join("hwmon").join("hwmon3");
        std::fs::create_dir_all(&hwmon).unwrap();
        std::fs::write(device.join("product_name"), "Radeon RX 7800 XT\n").unwrap();
        std::fs::write(device.join("gpu_busy_percent"), "42\n").unwrap();
        std::fs::write(hwmon.join("temp1_input"), "61000\n").unwrap();

        let reading = read_drm_sysfs(&device).await.unwrap();
        assert_eq!(reading.name, "Radeon RX 7800 XT");
        assert_eq!(reading.utilization_percent, 42.0);
        assert_eq!(reading.temperature_c, 61.0);
    }

    #[tokio::test]
    async fn drm_fallback_returns_none_for_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_drm_sysfs(&dir.path().join("missing")).await.is_none());
    }
}
