use sysinfo::{ComponentExt, System, SystemExt};

/// Package/core sensor labels that identify a CPU thermal component.
const CPU_MARKERS: [&str; 6] = ["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];
const GPU_MARKERS: [&str; 4] = ["gpu", "nvidia", "amdgpu", "radeon"];
const PLAUSIBLE_C: std::ops::RangeInclusive<f64> = 0.0..=130.0;

/// Reads the CPU temperature from the thermal components sysinfo exposes.
/// Prefers explicitly CPU-labelled sensors, then any non-GPU sensor, and
/// gives up rather than reporting a GPU diode as the CPU.
pub fn read_cpu_temp(system: &mut System) -> Option<f64> {
    system.refresh_components_list();
    system.refresh_components();
    let temps: Vec<(String, f64)> = system
        .components()
        .iter()
        .map(|c| (c.label().to_string(), f64::from(c.temperature())))
        .collect();
    pick_cpu_temp(&temps)
}

pub(crate) fn pick_cpu_temp(temps: &[(String, f64)]) -> Option<f64> {
    let plausible = || {
        temps
            .iter()
            .filter(|(_, t)| PLAUSIBLE_C.contains(t))
            .map(|(label, t)| (label.to_lowercase(), *t))
    };

    let primary = plausible()
        .filter(|(label, _)| {
            CPU_MARKERS.iter().any(|m| label.contains(m))
                && !GPU_MARKERS.iter().any(|m| label.contains(m))
        })
        .map(|(_, t)| t)
        .max_by(|a, b| a.total_cmp(b));
    if primary.is_some() {
        return primary;
    }

    plausible()
        .filter(|(label, _)| !GPU_MARKERS.iter().any(|m| label.contains(m)))
        .map(|(_, t)| t)
        .max_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temps(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
        entries
            .iter()
            .map(|(l, t)| (l.to_string(), *t))
            .collect()
    }

    #[test]
    fn prefers_cpu_labelled_sensor_over_hotter_gpu() {
        let readings = temps(&[("amdgpu edge", 74.0), ("k10temp Tctl", 58.5)]);
        assert_eq!(pick_cpu_temp(&readings), Some(58.5));
    }

    #[test]
    fn falls_back_to_non_gpu_sensor_without_cpu_markers() {
        let readings = temps(&[("nvme Composite", 41.0), ("nvidia gpu", 70.0)]);
        assert_eq!(pick_cpu_temp(&readings), Some(41.0));
    }

    #[test]
    fn implausible_values_are_ignored() {
        let readings = temps(&[("coretemp Package id 0", 250.0), ("coretemp Core 0", -40.0)]);
        assert_eq!(pick_cpu_temp(&readings), None);
    }

    #[test]
    fn empty_component_list_is_none() {
        assert_eq!(pick_cpu_temp(&[]), None);
    }
}
