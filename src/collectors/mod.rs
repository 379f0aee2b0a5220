pub mod cpu;
pub mod fan;
pub mod gpu;

use crate::config::Config;
use sysinfo::System;

/// Last-known local hardware readings. Each `Option` doubles as the
/// per-field validity flag: `None` means the source could not be read on
/// the last pass and the renderer shows a placeholder for it.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    pub gpu: Option<GpuReading>,
    pub fan: Option<FanReading>,
    pub cpu_temp_c: Option<f64>,
    pub collected_at_unix: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuReading {
    pub name: String,
    pub temperature_c: f64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSource {
    Hwmon,
    Nvidia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanReading {
    pub rpm: u32,
    /// The raw reading exceeded the configured ceiling and was clamped.
    pub clamped: bool,
    pub source: FanSource,
}

/// One collection pass. Sources are independent: a failure in one leaves
/// the others intact and only its own field unset.
pub async fn collect(cfg: &Config, system: &mut System, now_unix: i64) -> SensorSnapshot {
    let gpu = gpu::read_gpu().await;
    let fan = fan::read_fan(cfg.fan_prefer, cfg.fan_max_rpm).await;
    let cpu_temp_c = cpu::read_cpu_temp(system);

    SensorSnapshot {
        gpu,
        fan,
        cpu_temp_c,
        collected_at_unix: now_unix,
    }
}
