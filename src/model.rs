//! Shared data model: metric types, measurement data, sample records,
//! and device descriptors.
//!
//! `MeasurementDatum` and `SampleRecord` are the typed internal
//! representation; the dynamic JSON shape used on the wire (see
//! [`crate::pipeline::query::Snapshot`]) is produced only at the boundary,
//! never carried internally.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default scale applied to derived percentages (utilizations, rates),
/// matching the `100·scale` clamp used throughout the pipeline.
pub const DEFAULT_SCALE: i64 = 100;

/// A stable, assignment-order device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A PCI Bus/Device/Function address, `dddd:bb:dd.f`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BdfAddress(pub String);

impl BdfAddress {
    pub fn new(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if is_bdf(&s) {
            Some(Self(s))
        } else {
            None
        }
    }
}

impl fmt::Display for BdfAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Matches `[0-9a-f]{4}:[0-9a-f]{2}:[0-9a-f]{2}.[0-9a-f]`, case-insensitive.
pub fn is_bdf(s: &str) -> bool {
    fn is_hex_run(chars: &[char], len: usize) -> bool {
        chars.len() == len && chars.iter().all(|c| c.is_ascii_hexdigit())
    }

    let lower = s.to_ascii_lowercase();
    let bytes: Vec<char> = lower.chars().collect();

    // domain:bus:device.function
    let parts: Vec<&str> = lower.splitn(3, ':').collect();
    if parts.len() != 3 {
        return false;
    }
    let domain: Vec<char> = parts[0].chars().collect();
    let bus: Vec<char> = parts[1].chars().collect();
    let rest = parts[2];

    let dot = match rest.find('.') {
        Some(i) => i,
        None => return false,
    };
    let device: Vec<char> = rest[..dot].chars().collect();
    let function: Vec<char> = rest[dot + 1..].chars().collect();

    let _ = &bytes;
    is_hex_run(&domain, 4)
        && is_hex_run(&bus, 2)
        && is_hex_run(&device, 2)
        && is_hex_run(&function, 1)
}

/// The closed enumeration of everything the pipeline can sample.
///
/// Every variant has a fixed [`MetricKind`] returned by [`MetricType::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricType {
    Power,
    Energy,
    ActualFrequency,
    RequestFrequency,
    GpuTemperature,
    MemoryTemperature,
    MemoryUsed,
    MemoryUtilization,
    MemoryBandwidth,
    MemoryRead,
    MemoryWrite,
    MemoryReadThroughput,
    MemoryWriteThroughput,
    Computation,
    EngineGroupComputeAllUtilization,
    EngineGroupMediaAllUtilization,
    EngineGroupCopyAllUtilization,
    EngineGroupRenderAllUtilization,
    EngineGroup3DAllUtilization,
    EuActive,
    EuStall,
    EuIdle,
    RasErrorReset,
    RasErrorProgrammingErrors,
    RasErrorDriverErrors,
    RasErrorCacheErrorsCorrectable,
    RasErrorCacheErrorsUncorrectable,
    RasErrorDisplayErrorsCorrectable,
    RasErrorDisplayErrorsUncorrectable,
    RasErrorNonComputeErrorsCorrectable,
    RasErrorNonComputeErrorsUncorrectable,
    FrequencyThrottle,
    PcieReadThroughput,
    PcieWriteThroughput,
    PcieRead,
    PcieWrite,
    EngineUtilization,
    FabricThroughput,
}

/// The four families of metric behavior the data-handler family knows
/// how to derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Instantaneous reading, published as-is.
    Gauge,
    /// Monotonic accumulator; rate is derived from consecutive deltas.
    Counter,
    /// `(active_time, timestamp)` pair; utilization derived from the delta
    /// ratio.
    ActiveTimePair,
    /// Computed from other raw readings rather than read directly (e.g.
    /// engine-group utilization aggregated across several engine handles).
    Derived,
}

impl MetricType {
    pub fn kind(self) -> MetricKind {
        use MetricType::*;
        match self {
            Power | ActualFrequency | RequestFrequency | GpuTemperature | MemoryTemperature
            | MemoryUsed | MemoryUtilization | MemoryBandwidth => MetricKind::Gauge,

            Energy | MemoryRead | MemoryWrite | MemoryReadThroughput | MemoryWriteThroughput
            | RasErrorReset
            | RasErrorProgrammingErrors
            | RasErrorDriverErrors
            | RasErrorCacheErrorsCorrectable
            | RasErrorCacheErrorsUncorrectable
            | RasErrorDisplayErrorsCorrectable
            | RasErrorDisplayErrorsUncorrectable
            | RasErrorNonComputeErrorsCorrectable
            | RasErrorNonComputeErrorsUncorrectable
            | PcieRead
            | PcieWrite
            | PcieReadThroughput
            | PcieWriteThroughput
            | FabricThroughput => MetricKind::Counter,

            FrequencyThrottle => MetricKind::ActiveTimePair,

            Computation
            | EngineGroupComputeAllUtilization
            | EngineGroupMediaAllUtilization
            | EngineGroupCopyAllUtilization
            | EngineGroupRenderAllUtilization
            | EngineGroup3DAllUtilization
            | EuActive
            | EuStall
            | EuIdle
            | EngineUtilization => MetricKind::Derived,
        }
    }
}

/// Which engine group a device's engine handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    Compute,
    Render,
    Media,
    Copy,
    ThreeD,
}

/// One `active_time`/`timestamp` sample from one engine handle, attached
/// opaquely to a device's [`MeasurementDatum::extended`] for engine-group
/// derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSample {
    pub handle_id: u64,
    pub engine_kind: EngineKind,
    pub on_subdevice: bool,
    pub subdevice_id: u32,
    pub active_time_us: i64,
    pub timestamp_us: i64,
    /// True when this raw reading is an `ENGINE_GROUP_*_ALL` aggregate
    /// handle rather than a single physical engine.
    pub is_aggregate: bool,
}

/// One fabric-port reading, already joined against device topology so its
/// `fabric_id` is the composite [`encode_fabric_throughput_id`] result —
/// attached opaquely to a device's [`MeasurementDatum::extended`] for
/// fabric-throughput rate derivation, the same way [`EngineSample`] carries
/// engine-group readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FabricSample {
    pub fabric_id: u64,
    pub value: i64,
    pub timestamp_us: i64,
}

/// Opaque extended payload a handler may need beyond the scalar reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedDatum {
    EngineSamples(Vec<EngineSample>),
    FabricSamples(Vec<FabricSample>),
}

/// Per-device (or per-subdevice) measurement at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDatum {
    pub current: i64,
    pub scale: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub avg: Option<i64>,
    pub accumulated: Option<i64>,
    pub timestamp_us: i64,
    pub num_subdevices: u32,
    pub subdevices: BTreeMap<u32, SubdeviceDatum>,
    #[serde(skip)]
    pub extended: Option<ExtendedDatum>,
}

impl MeasurementDatum {
    pub fn new(current: i64, scale: i64, timestamp_us: i64) -> Self {
        Self {
            current,
            scale,
            min: None,
            max: None,
            avg: None,
            accumulated: None,
            timestamp_us,
            num_subdevices: 0,
            subdevices: BTreeMap::new(),
            extended: None,
        }
    }

    pub fn subdevice_current(&self, subdevice_id: u32) -> Option<i64> {
        self.subdevices.get(&subdevice_id).map(|d| d.current)
    }

    pub fn set_subdevice_current(&mut self, subdevice_id: u32, current: i64) {
        let entry = self
            .subdevices
            .entry(subdevice_id)
            .or_insert_with(|| SubdeviceDatum::new(current, self.timestamp_us));
        entry.current = current;
        entry.timestamp_us = self.timestamp_us;
    }
}

/// Same fields as [`MeasurementDatum`] but scoped to one subdevice/tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdeviceDatum {
    pub current: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub avg: Option<i64>,
    pub accumulated: Option<i64>,
    pub timestamp_us: i64,
}

impl SubdeviceDatum {
    pub fn new(current: i64, timestamp_us: i64) -> Self {
        Self {
            current,
            min: None,
            max: None,
            avg: None,
            accumulated: None,
            timestamp_us,
        }
    }
}

/// Immutable snapshot of one sampling round for one metric type across
/// all devices.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub metric_type: MetricType,
    pub sampled_at_us: i64,
    pub data: BTreeMap<DeviceId, MeasurementDatum>,
}

impl SampleRecord {
    pub fn new(metric_type: MetricType, sampled_at_us: i64) -> Self {
        Self {
            metric_type,
            sampled_at_us,
            data: BTreeMap::new(),
        }
    }
}

/// What a device can do: gates which sampling loops and config operations
/// apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceCapability {
    Metric(MetricType),
    PowerLimit,
    FrequencyRange,
    Standby,
    Scheduler,
    PerformanceFactor,
    FabricPort,
    MemoryEcc,
    Reset,
}

/// Name/value property bag: fabric ID, tile count, firmware strings, and
/// the platform-family name used to select the engine-group policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyBag {
    values: BTreeMap<String, String>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn device_name(&self) -> Option<&str> {
        self.get("device_name")
    }

    pub fn fabric_id(&self) -> Option<u32> {
        self.get("fabric_id").and_then(|v| v.parse().ok())
    }

    pub fn num_tiles(&self) -> u32 {
        self.get("num_tiles")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Identifies one physical engine for a device, or one `ENGINE_GROUP_*_ALL`
/// aggregate handle (`is_aggregate`) on device generations that report
/// engine-group utilization directly rather than per-engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle {
    pub handle_id: u64,
    pub kind: EngineKind,
    pub on_subdevice: bool,
    pub subdevice_id: u32,
    pub is_aggregate: bool,
}

/// One side of a fabric-port link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FabricPortHandle {
    pub attach_id: u32,
    pub remote_fabric_id: u32,
    pub remote_attach_id: u32,
}

/// Deterministic composite ID so two sides of the same fabric link can be
/// joined: `encode(attach_id, remote_fabric_id, remote_attach_id, direction)`.
pub fn encode_fabric_throughput_id(
    attach_id: u32,
    remote_fabric_id: u32,
    remote_attach_id: u32,
    direction: FabricDirection,
) -> u64 {
    let dir_bit = match direction {
        FabricDirection::Received => 0u64,
        FabricDirection::Transmitted => 1u64,
    };
    (attach_id as u64) << 48
        | (remote_fabric_id as u64) << 32
        | (remote_attach_id as u64) << 1
        | dir_bit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricDirection {
    Received,
    Transmitted,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_well_formed_bdf() {
        assert!(is_bdf("0000:3d:00.0"));
        assert!(is_bdf("FFFF:ff:1f.7"));
    }

    #[test]
    fn rejects_malformed_bdf() {
        assert!(!is_bdf("0:3d:00.0"));
        assert!(!is_bdf("0000:3d:00"));
        assert!(!is_bdf("gggg:3d:00.0"));
        assert!(!is_bdf("0000-3d-00.0"));
    }

    #[test]
    fn fabric_ids_round_trip_distinctly() {
        let a = encode_fabric_throughput_id(1, 2, 3, FabricDirection::Received);
        let b = encode_fabric_throughput_id(1, 2, 3, FabricDirection::Transmitted);
        assert_ne!(a, b);
    }

    #[test]
    fn metric_kind_classification_matches_design() {
        assert_eq!(MetricType::Power.kind(), MetricKind::Gauge);
        assert_eq!(MetricType::Energy.kind(), MetricKind::Counter);
        assert_eq!(MetricType::FrequencyThrottle.kind(), MetricKind::ActiveTimePair);
        assert_eq!(
            MetricType::EngineGroupComputeAllUtilization.kind(),
            MetricKind::Derived
        );
    }
}
