//! The hardware-sysman capability interface.
//!
//! This is the narrow boundary the core consumes to talk to real devices.
//! It is intentionally thin: one capability method per raw-datum shape
//! (not one per [`MetricType`][crate::model::MetricType]), plus the
//! introspection and mutation entry points named in the external
//! interfaces design. Every method is safe to call concurrently across
//! distinct device handles.

pub mod demo_backend;
#[cfg(test)]
pub mod test_util;

use std::collections::HashMap;

use crate::control::command::ConfigParams;
use crate::control::parse::PerfEngine;
use crate::error::Result;
use crate::model::{
    BdfAddress, DeviceCapability, EngineHandle, FabricDirection, FabricPortHandle, PropertyBag,
};

/// Opaque handle a backend uses to address a device. The core never
/// inspects its contents.
pub type DeviceHandle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawGauge {
    pub value: i64,
    pub timestamp_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounter {
    pub value: i64,
    pub timestamp_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawActiveTimePair {
    pub active_time_us: i64,
    pub timestamp_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEngineSample {
    pub handle_id: u64,
    pub active_time_us: i64,
    pub timestamp_us: i64,
}

/// One directional reading off one fabric port, identified by the local
/// `attach_id` a backend reported through [`DeviceBackend::fabric_port_handles`].
/// The sampling loop joins this against the device's fabric-port topology
/// to compute the composite `fabric_id` used for delta tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFabricSample {
    pub attach_id: u32,
    pub direction: FabricDirection,
    pub value: i64,
    pub timestamp_us: i64,
}

/// A process using a device, surfaced before a destructive reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub process_id: u32,
    pub process_name: String,
}

/// The result of a successful mutator call (`apply`); the device's own
/// wording / rounded value, surfaced back through `CommandResult.details`.
/// For example the frequency-range mutator may echo back the
/// device-rounded option nearest the request, and the memory-ECC mutator
/// echoes the pending (post-reboot) state.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub echoed_value: Option<String>,
}

impl ApplyOutcome {
    pub fn empty() -> Self {
        Self { echoed_value: None }
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            echoed_value: Some(value.into()),
        }
    }
}

/// Current device-configuration state, as returned by the `query`
/// operation. Every field is optional since not every device supports
/// every configurable.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConfigSnapshot {
    pub power_limit_watts: Option<i64>,
    pub min_frequency: Option<i64>,
    pub max_frequency: Option<i64>,
    pub standby_mode: Option<String>,
    pub scheduler_mode: Option<String>,
    pub compute_performance_factor: Option<f64>,
    pub media_performance_factor: Option<f64>,
    pub memory_ecc_current_state: Option<String>,
    pub memory_ecc_pending_state: Option<String>,
}

/// Per-tile state mutated by `SetFrequencyRange`/`SetStandby`/`SetScheduler`/
/// `SetPerformanceFactor`, tracked so `query_config` can echo it back.
#[derive(Debug, Clone, Default)]
pub(crate) struct TileConfig {
    pub min_frequency: Option<i64>,
    pub max_frequency: Option<i64>,
    pub standby_mode: Option<String>,
    pub scheduler_mode: Option<String>,
    pub compute_performance_factor: Option<f64>,
    pub media_performance_factor: Option<f64>,
}

/// Record of every `apply` call a backend has serviced for one device,
/// keyed by tile where the field is tile-scoped. Shared by [`demo_backend`]
/// and [`test_util`] so `query_config` reflects prior mutations instead of
/// always reporting [`ConfigSnapshot::default`].
#[derive(Debug, Clone, Default)]
pub(crate) struct AppliedConfig {
    pub power_limit_watts: Option<i64>,
    pub memory_ecc_pending_state: Option<String>,
    pub tiles: HashMap<u32, TileConfig>,
}

impl AppliedConfig {
    pub(crate) fn record(&mut self, params: &ConfigParams) {
        match params {
            ConfigParams::SetPowerLimit { watts, .. } => self.power_limit_watts = Some(*watts),
            ConfigParams::SetFrequencyRange { tile, min, max } => {
                let t = self.tiles.entry(*tile).or_default();
                t.min_frequency = Some(*min);
                t.max_frequency = Some(*max);
            }
            ConfigParams::SetStandby { tile, mode } => {
                self.tiles.entry(*tile).or_default().standby_mode =
                    Some(crate::control::parse::format_standby(*mode).to_string());
            }
            ConfigParams::SetScheduler { tile, spec } => {
                self.tiles.entry(*tile).or_default().scheduler_mode =
                    Some(crate::control::parse::format_scheduler_spec(*spec));
            }
            ConfigParams::SetPerformanceFactor { tile, engine, value } => {
                let t = self.tiles.entry(*tile).or_default();
                match engine {
                    PerfEngine::Compute => t.compute_performance_factor = Some(*value),
                    PerfEngine::Media => t.media_performance_factor = Some(*value),
                }
            }
            ConfigParams::SetFabricPort { .. } | ConfigParams::SetFabricBeaconing { .. } => {}
            ConfigParams::SetMemoryEcc { enabled } => {
                self.memory_ecc_pending_state =
                    Some(if *enabled { "enabled" } else { "disabled" }.to_string());
            }
        }
    }

    pub(crate) fn snapshot(&self, tile: Option<u32>) -> ConfigSnapshot {
        let tile_cfg = self.tiles.get(&tile.unwrap_or(0));
        ConfigSnapshot {
            power_limit_watts: self.power_limit_watts,
            min_frequency: tile_cfg.and_then(|t| t.min_frequency),
            max_frequency: tile_cfg.and_then(|t| t.max_frequency),
            standby_mode: tile_cfg.and_then(|t| t.standby_mode.clone()),
            scheduler_mode: tile_cfg.and_then(|t| t.scheduler_mode.clone()),
            compute_performance_factor: tile_cfg.and_then(|t| t.compute_performance_factor),
            media_performance_factor: tile_cfg.and_then(|t| t.media_performance_factor),
            memory_ecc_current_state: None,
            memory_ecc_pending_state: self.memory_ecc_pending_state.clone(),
        }
    }
}

/// Enumerated device, as returned by [`DeviceBackend::enumerate_devices`].
#[derive(Debug, Clone)]
pub struct EnumeratedDevice {
    pub handle: DeviceHandle,
    pub bdf: BdfAddress,
    pub capabilities: Vec<DeviceCapability>,
    pub properties: PropertyBag,
    pub engines: Vec<EngineHandle>,
    pub fabric_ports: Vec<FabricPortHandle>,
}

/// The capability interface consumed by the sampling loops, the device
/// registry, and the config command surface.
///
/// Implementations must be `Send + Sync`: device handles are shared freely
/// across sampler threads and caller threads.
pub trait DeviceBackend: Send + Sync {
    fn enumerate_devices(&self) -> Result<Vec<EnumeratedDevice>>;

    fn device_properties(&self, handle: DeviceHandle) -> Result<PropertyBag>;
    fn engine_handles(&self, handle: DeviceHandle) -> Result<Vec<EngineHandle>>;
    fn fabric_port_handles(&self, handle: DeviceHandle) -> Result<Vec<FabricPortHandle>>;

    /// Read a gauge-kind metric (temperature, power, instantaneous
    /// frequency, ...). `subdevice` selects a tile when the metric is
    /// tile-scoped.
    fn read_gauge(
        &self,
        handle: DeviceHandle,
        metric: crate::model::MetricType,
        subdevice: Option<u32>,
    ) -> Result<RawGauge>;

    /// Read a counter-kind metric (energy, PCIe bytes, RAS error counts, ...).
    fn read_counter(
        &self,
        handle: DeviceHandle,
        metric: crate::model::MetricType,
        subdevice: Option<u32>,
    ) -> Result<RawCounter>;

    /// Read an active-time-pair metric (frequency-throttle-time, ...).
    fn read_active_time_pair(
        &self,
        handle: DeviceHandle,
        metric: crate::model::MetricType,
        subdevice: Option<u32>,
    ) -> Result<RawActiveTimePair>;

    /// Read every engine handle's active-time sample this tick, for
    /// engine-group utilization derivation.
    fn read_engine_groups(&self, handle: DeviceHandle) -> Result<Vec<RawEngineSample>>;

    /// Read every fabric port's received/transmitted byte counter this
    /// tick, for fabric-throughput rate derivation.
    fn read_fabric_throughput(&self, handle: DeviceHandle) -> Result<Vec<RawFabricSample>>;

    /// Apply a validated config mutation.
    fn apply(&self, handle: DeviceHandle, params: &ConfigParams) -> Result<ApplyOutcome>;

    /// Read current device-configuration state for the `query` operation.
    fn query_config(&self, handle: DeviceHandle, tile: Option<u32>) -> Result<ConfigSnapshot>;

    fn reset(&self, handle: DeviceHandle, force: bool) -> Result<()>;
    fn process_list(&self, handle: DeviceHandle) -> Result<Vec<ProcessInfo>>;
}
