//! The data handler family: one stateful transformer per metric type,
//! mediating between raw samples and consumers.

pub mod counter_rate;
pub mod engine_group;
pub mod fabric_throughput;
pub mod passthrough;
pub mod stats;
pub mod time_weighted_average;

use std::collections::BTreeMap;

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};

pub use counter_rate::CounterRateHandler;
pub use engine_group::EngineGroupHandler;
pub use fabric_throughput::FabricThroughputHandler;
pub use passthrough::PassthroughHandler;
pub use stats::{SessionId, DEFAULT_SESSION};
pub use time_weighted_average::TimeWeightedAverageHandler;

/// Common contract every handler variant implements. See module docs on
/// each variant for its specific derivation.
pub trait DataHandler: Send + Sync {
    fn metric_type(&self) -> MetricType;

    /// Rotates `previous <- latest`, publishes `record` as `latest`, and
    /// enqueues it to the persistence sink. Called synchronously by the
    /// sampler before `handle`.
    fn pre_handle(&self, record: SampleRecord);

    /// Performs the handler-specific derivation, mutating the published
    /// `latest` record in place under the same mutex `pre_handle` uses.
    fn handle(&self);

    fn latest_for(&self, device_id: DeviceId) -> Option<MeasurementDatum>;
    fn latest_stats_for(&self, device_id: DeviceId, session: SessionId) -> Option<MeasurementDatum>;
    fn bulk_latest(&self) -> BTreeMap<DeviceId, MeasurementDatum>;
    fn reset_session(&self, session: SessionId);
}
