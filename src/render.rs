use crate::collectors::SensorSnapshot;
use crate::weather::{WeatherSnapshot, WeatherStatus};

pub const FRAME_HEADER: u8 = 0xAA;
pub const FRAME_TRAILER: [u8; 4] = [0xCC, 0x33, 0xC3, 0x3C];
// Panel-assigned tile id and sequence byte for the combined status tile.
const TILE_ID: u8 = 0x53;
const SEQ: u8 = b'2';

const PLACEHOLDER: &str = "--";
const TEXT_PLACEHOLDER: &str = "N/A";

/// One complete unit of display content. Every field is already formatted
/// and sanitized; encoding is a pure concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub gpu_name: String,
    pub gpu_temp: String,
    pub gpu_util: String,
    pub fan_rpm: String,
    pub cpu_temp: String,
    pub weather_temp: String,
    pub weather_desc: String,
    pub weather_zone: String,
}

/// Pure projection of the two snapshots into a frame. Absent or invalid
/// data becomes a placeholder; a cached-but-offline weather reading keeps
/// its values with a staleness marker.
pub fn render(sensor: &SensorSnapshot, weather: &WeatherSnapshot) -> Frame {
    let (gpu_name, gpu_temp, gpu_util) = match &sensor.gpu {
        Some(gpu) => (
            sanitize_field(&gpu.name),
            format!("{:.0}", gpu.temperature_c),
            format!("{:.0}", gpu.utilization_percent),
        ),
        None => (
            "GPU".to_string(),
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
        ),
    };

    let fan_rpm = match &sensor.fan {
        Some(fan) if fan.clamped => format!("{}!", fan.rpm),
        Some(fan) => fan.rpm.to_string(),
        None => PLACEHOLDER.to_string(),
    };

    let cpu_temp = match sensor.cpu_temp_c {
        Some(t) => format!("{t:.0}"),
        None => PLACEHOLDER.to_string(),
    };

    let (weather_temp, weather_desc, weather_zone) = match (&weather.current, weather.status) {
        (Some(current), WeatherStatus::Online) => (
            format!("{:.0}", current.temperature),
            sanitize_field(&current.description),
            sanitize_field(&current.location),
        ),
        (Some(current), WeatherStatus::Offline) => (
            format!("{:.0}*", current.temperature),
            sanitize_field(&current.description),
            sanitize_field(&current.location),
        ),
        (None, _) => (
            PLACEHOLDER.to_string(),
            TEXT_PLACEHOLDER.to_string(),
            TEXT_PLACEHOLDER.to_string(),
        ),
    };

    Frame {
        gpu_name,
        gpu_temp,
        gpu_util,
        fan_rpm,
        cpu_temp,
        weather_temp,
        weather_desc,
        weather_zone,
    }
}

impl Frame {
    pub fn payload(&self) -> String {
        format!(
            "{{GPU:{};Tempr:{};Useage:{};SPEED:{};CPUTempr:{};Weather:{};Zone:{};Desc:{}}}",
            self.gpu_name,
            self.gpu_temp,
            self.gpu_util,
            self.fan_rpm,
            self.cpu_temp,
            self.weather_temp,
            self.weather_zone,
            self.weather_desc,
        )
    }

    /// Serializes one self-contained wire frame: header, tile id, sequence
    /// byte, ASCII payload, trailer.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(payload.len() + 8);
        out.extend_from_slice(&[FRAME_HEADER, TILE_ID, 0x00, SEQ]);
        out.extend_from_slice(payload.as_bytes());
        out.extend_from_slice(&FRAME_TRAILER);
        out
    }
}

/// The payload is ASCII with `;` as the field separator, so free text has
/// non-ASCII replaced with `?` and separators with `,`.
pub(crate) fn sanitize_field(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ';' => ',',
            c if (' '..='~').contains(&c) => c,
            _ => '?',
        })
        .collect()
}
