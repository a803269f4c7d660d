//! Monitor configuration.
//!
//! Defaults match a 1 Hz host cadence with 60-point histories. A JSON file may
//! override any subset of fields; two environment variables override the
//! sampler output path and sampler program:
//!
//! - `LIQUIDMON_METRICS_PATH`: file the privileged sampler writes to
//! - `LIQUIDMON_SAMPLER`: sampler executable

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;

pub const METRICS_PATH_ENV: &str = "LIQUIDMON_METRICS_PATH";
pub const SAMPLER_ENV: &str = "LIQUIDMON_SAMPLER";

/// Settings for the privileged power sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub program: String,
    /// Sampling interval passed to the sampler.
    pub interval_ms: u64,
    pub samplers: Vec<String>,
    pub output_path: PathBuf,
    pub error_log_path: PathBuf,
    /// Upper bound on the elevation prompt (it waits for the user).
    pub elevation_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            program: "/usr/bin/powermetrics".to_string(),
            interval_ms: 1000,
            samplers: ["cpu_power", "gpu_power", "thermal", "battery", "ane_power", "sfi"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_path: PathBuf::from("/tmp/liquidmonitor_metrics.plist"),
            error_log_path: PathBuf::from("/tmp/liquidmonitor_error.log"),
            elevation_timeout_ms: 120_000,
        }
    }
}

impl SamplerConfig {
    pub fn elevation_timeout(&self) -> Duration {
        Duration::from_millis(self.elevation_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub host_interval_ms: u64,
    pub process_interval_ms: u64,
    pub battery_interval_ms: u64,
    pub history_capacity: usize,
    pub process_history_capacity: usize,
    pub top_n: usize,
    /// "Others" is shown only when the remainder exceeds this percentage.
    pub others_threshold: f64,
    /// Bound on every short-lived external command (`ps`, `ioreg`, `pmset`).
    pub command_timeout_ms: u64,
    pub sampler: SamplerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host_interval_ms: 1000,
            process_interval_ms: 1000,
            battery_interval_ms: 5000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            process_history_capacity: 20,
            top_n: 5,
            others_threshold: 0.1,
            command_timeout_ms: 2000,
            sampler: SamplerConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load a JSON file; missing fields keep their defaults. Environment
    /// overrides are applied on top.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(text: &str) -> io::Result<Self> {
        serde_json::from_str(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(METRICS_PATH_ENV).ok(),
            std::env::var(SAMPLER_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, metrics_path: Option<String>, sampler: Option<String>) {
        if let Some(path) = metrics_path.filter(|p| !p.trim().is_empty()) {
            self.sampler.output_path = PathBuf::from(path);
        }
        if let Some(program) = sampler.filter(|p| !p.trim().is_empty()) {
            self.sampler.program = program;
        }
    }

    pub fn host_interval(&self) -> Duration {
        Duration::from_millis(self.host_interval_ms.max(1))
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms.max(1))
    }

    pub fn battery_interval(&self) -> Duration {
        Duration::from_millis(self.battery_interval_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = MonitorConfig::default();
        assert_eq!(c.host_interval(), Duration::from_secs(1));
        assert_eq!(c.battery_interval(), Duration::from_secs(5));
        assert_eq!(c.history_capacity, 60);
        assert_eq!(c.process_history_capacity, 20);
        assert_eq!(c.top_n, 5);
        assert_eq!(c.sampler.samplers.len(), 6);
        assert_eq!(c.sampler.elevation_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = MonitorConfig::from_json(r#"{"host_interval_ms": 500, "sampler": {"interval_ms": 250}}"#)
            .unwrap();
        assert_eq!(c.host_interval_ms, 500);
        assert_eq!(c.process_interval_ms, 1000);
        assert_eq!(c.sampler.interval_ms, 250);
        assert_eq!(c.sampler.program, "/usr/bin/powermetrics");
    }

    #[test]
    fn invalid_json_is_invalid_data() {
        let err = MonitorConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn overrides_replace_paths() {
        let mut c = MonitorConfig::default();
        c.apply_overrides(Some("/var/tmp/m.plist".into()), Some("/opt/sampler".into()));
        assert_eq!(c.sampler.output_path, PathBuf::from("/var/tmp/m.plist"));
        assert_eq!(c.sampler.program, "/opt/sampler");
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut c = MonitorConfig::default();
        c.apply_overrides(Some("  ".into()), None);
        assert_eq!(c.sampler, SamplerConfig::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"top_n": 3}"#).unwrap();
        let c = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(c.top_n, 3);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let c = MonitorConfig {
            host_interval_ms: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(c.host_interval(), Duration::from_millis(1));
    }
}
