//! Service-level configuration: sampling cadence per metric type, health
//! threshold defaults, sink backend selection, and the log filter.
//!
//! Distinct from the device-configuration surface in `control::command`
//! (§4.F) — this is configuration of the *service itself*, loaded once at
//! startup from a TOML file with environment-variable overrides, mirroring
//! the teacher's single `Opts`-style settings struct.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GpumondError, Result};
use crate::model::MetricType;

const ENV_PREFIX: &str = "GPUMOND_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SinkBackend {
    Null,
    Channel,
}

impl Default for SinkBackend {
    fn default() -> Self {
        SinkBackend::Null
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholdDefaults {
    pub core_temp_throttle_c: i64,
    pub core_temp_shutdown_c: i64,
    pub memory_temp_throttle_c: i64,
    pub memory_temp_shutdown_c: i64,
    pub power_throttle_w: i64,
    pub power_shutdown_w: i64,
}

impl Default for HealthThresholdDefaults {
    fn default() -> Self {
        Self {
            core_temp_throttle_c: 85,
            core_temp_shutdown_c: 105,
            memory_temp_throttle_c: 85,
            memory_temp_shutdown_c: 100,
            power_throttle_w: 250,
            power_shutdown_w: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Sampling period per metric type, in milliseconds. Metric types
    /// absent from this map are not sampled.
    pub sampling_period_ms: BTreeMap<MetricType, u64>,
    pub health_thresholds: HealthThresholdDefaults,
    pub sink_backend: SinkBackend,
    /// `tracing-subscriber` `EnvFilter` directive, e.g. `"info"` or
    /// `"gpumond=debug,warn"`.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        let mut sampling_period_ms = BTreeMap::new();
        sampling_period_ms.insert(MetricType::Power, 1_000);
        sampling_period_ms.insert(MetricType::GpuTemperature, 1_000);
        sampling_period_ms.insert(MetricType::MemoryTemperature, 1_000);
        sampling_period_ms.insert(MetricType::Energy, 1_000);
        sampling_period_ms.insert(MetricType::PcieReadThroughput, 1_000);
        sampling_period_ms.insert(MetricType::PcieWriteThroughput, 1_000);
        sampling_period_ms.insert(MetricType::FrequencyThrottle, 1_000);
        sampling_period_ms.insert(MetricType::EngineGroupComputeAllUtilization, 1_000);
        sampling_period_ms.insert(MetricType::EngineGroupMediaAllUtilization, 1_000);
        sampling_period_ms.insert(MetricType::EngineGroupCopyAllUtilization, 1_000);
        sampling_period_ms.insert(MetricType::EngineGroupRenderAllUtilization, 1_000);
        sampling_period_ms.insert(MetricType::EngineGroup3DAllUtilization, 1_000);
        sampling_period_ms.insert(MetricType::Computation, 1_000);

        Self {
            sampling_period_ms,
            health_thresholds: HealthThresholdDefaults::default(),
            sink_backend: SinkBackend::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file, then applies any `GPUMOND_*`
    /// environment overrides recognized below (currently just the log
    /// filter, the one setting operators commonly need to flip without
    /// editing a file).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GpumondError::BadArgument(format!("cannot read settings file {}: {e}", path.display())))?;
        let mut settings: Settings = toml::from_str(&contents)
            .map_err(|e| GpumondError::BadArgument(format!("invalid settings file {}: {e}", path.display())))?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(filter) = env::var(format!("{ENV_PREFIX}LOG_FILTER")) {
            self.log_filter = filter;
        }
    }

    pub fn sampling_period(&self, metric_type: MetricType) -> Option<Duration> {
        self.sampling_period_ms.get(&metric_type).map(|&ms| Duration::from_millis(ms))
    }
}
