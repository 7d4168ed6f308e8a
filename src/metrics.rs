//! CPU utilization and temperature sampling.
//!
//! Measurement lives outside the engine: workers report configured targets
//! only, and this sampler reports what the OS actually observes. Values are
//! meaningful from the second refresh onward, so callers sample on a fixed
//! interval and expose the latest reading.

use serde::Serialize;
use sysinfo::{Components, CpuRefreshKind, RefreshKind, System};

/// Sensor labels tried first when picking a CPU temperature reading.
const CPU_SENSOR_LABELS: [&str; 5] = ["coretemp", "cpu_thermal", "acpi", "k8temp", "k10temp"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct CpuMetrics {
    pub total_cpu_percent: f32,
    pub per_cpu_percent: Vec<f32>,
    pub cpu_temperature: Option<f32>,
}

pub struct CpuSampler {
    sys: System,
    read_temperature: bool,
}

impl CpuSampler {
    pub fn new(read_temperature: bool) -> CpuSampler {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        // Prime the usage counters; the first delta is computed against this.
        sys.refresh_cpu_usage();
        CpuSampler {
            sys,
            read_temperature,
        }
    }

    /// Refreshes counters and returns utilization since the previous call.
    pub fn sample(&mut self) -> CpuMetrics {
        self.sys.refresh_cpu_usage();
        let per_cpu_percent: Vec<f32> = self
            .sys
            .cpus()
            .iter()
            .map(|cpu| round1(cpu.cpu_usage()))
            .collect();
        let total_cpu_percent = round1(self.sys.global_cpu_usage());
        let cpu_temperature = if self.read_temperature {
            read_cpu_temperature()
        } else {
            None
        };
        CpuMetrics {
            total_cpu_percent,
            per_cpu_percent,
            cpu_temperature,
        }
    }
}

/// Picks a CPU temperature from the system's sensors, preferring well-known
/// CPU sensor labels and falling back to the first sensor that reports one.
/// Returns `None` on machines without usable sensors.
fn read_cpu_temperature() -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    let mut fallback = None;

    for component in components.iter() {
        let temperature = match component.temperature() {
            Some(value) => value,
            None => continue,
        };
        let label = component.label().to_ascii_lowercase();
        if CPU_SENSOR_LABELS.iter().any(|name| label.contains(name)) {
            return Some(round1(temperature));
        }
        if fallback.is_none() {
            fallback = Some(round1(temperature));
        }
    }
    fallback
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
