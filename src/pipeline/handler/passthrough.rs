//! Passthrough handler for gauge-kind metrics (temperature, request
//! frequency, memory used/utilization, ...). The raw reading already is
//! the reported value; `handle` is a no-op, since `pre_handle`'s rotation
//! already publishes `current` into `latest`. No rolling min/max/avg is
//! kept for passthrough metrics — that belongs to the metric-statistics
//! base used by the other handler variants.

use std::sync::Arc;

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

use super::stats::{HandlerBase, SessionId};
use super::DataHandler;

pub struct PassthroughHandler {
    base: HandlerBase,
}

impl PassthroughHandler {
    pub fn new(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            base: HandlerBase::new(metric_type, sink),
        }
    }
}

impl DataHandler for PassthroughHandler {
    fn metric_type(&self) -> MetricType {
        self.base.metric_type()
    }

    fn pre_handle(&self, record: SampleRecord) {
        self.base.pre_handle(record);
    }

    fn handle(&self) {
        // No-op: `pre_handle`'s rotation already published `current`.
    }

    fn latest_for(&self, device_id: DeviceId) -> Option<MeasurementDatum> {
        self.base.latest_for(device_id)
    }

    fn latest_stats_for(&self, device_id: DeviceId, session: SessionId) -> Option<MeasurementDatum> {
        self.base.latest_stats_for(device_id, session)
    }

    fn bulk_latest(&self) -> std::collections::BTreeMap<DeviceId, MeasurementDatum> {
        self.base.bulk_latest()
    }

    fn reset_session(&self, session: SessionId) {
        self.base.reset_session(session);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipeline::sink::NullSink;

    fn record(ts: i64, values: &[(u32, i64)]) -> SampleRecord {
        let mut builder = crate::pipeline::sample::SampleBuilder::new(MetricType::GpuTemperature, ts);
        for &(id, v) in values {
            builder.insert(DeviceId(id), MeasurementDatum::new(v, 1, ts));
        }
        builder.build()
    }

    #[test]
    fn current_passes_through_untouched_by_handle() {
        let handler = PassthroughHandler::new(MetricType::GpuTemperature, Arc::new(NullSink));
        handler.pre_handle(record(1_000, &[(0, 60)]));
        handler.handle();
        handler.pre_handle(record(2_000, &[(0, 80)]));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 80);
        assert_eq!(datum.min, None);
        assert_eq!(datum.max, None);
        assert_eq!(datum.avg, None);
    }

    #[test]
    fn missing_device_after_removal_is_simply_absent() {
        let handler = PassthroughHandler::new(MetricType::GpuTemperature, Arc::new(NullSink));
        handler.pre_handle(record(1_000, &[(0, 60), (1, 65)]));
        handler.handle();
        handler.pre_handle(record(2_000, &[(0, 61)]));
        handler.handle();
        assert!(handler.latest_for(DeviceId(1)).is_none());
    }
}
