//! Time-weighted average handler, for metrics whose natural report is an
//! integral since boot (e.g. frequency-throttle-time). Behaves as
//! [`super::counter_rate`] but normalizes the delta ratio into
//! `[0, scale]` instead of converting to a per-second rate.

use std::sync::Arc;

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

use super::stats::{delta_value, record_stat, HandlerBase, SessionId};
use super::DataHandler;

pub struct TimeWeightedAverageHandler {
    base: HandlerBase,
}

impl TimeWeightedAverageHandler {
    pub fn new(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            base: HandlerBase::new(metric_type, sink),
        }
    }
}

impl DataHandler for TimeWeightedAverageHandler {
    fn metric_type(&self) -> MetricType {
        self.base.metric_type()
    }

    fn pre_handle(&self, record: SampleRecord) {
        self.base.pre_handle(record);
    }

    fn handle(&self) {
        self.base.with_derivation(|previous, data, sessions| {
            for (device_id, datum) in data.iter_mut() {
                let raw_now = datum.current;
                let scale = datum.scale.max(1);
                let prev_datum = previous.and_then(|p| p.data.get(device_id));
                let delta_t = prev_datum.map(|p| datum.timestamp_us - p.timestamp_us);
                let previous_raw = prev_datum.map(|p| p.accumulated.unwrap_or(p.current));

                let derived = delta_t.and_then(|dt| delta_value(previous_raw, raw_now, dt).map(|dv| (dv, dt)));

                datum.current = match derived {
                    Some((delta, dt)) => (scale * delta / dt).clamp(0, scale),
                    None => prev_datum.map(|p| p.current).unwrap_or(0),
                };
                datum.accumulated = Some(raw_now);

                let (min, max, avg) = record_stat(sessions, *device_id, datum.current);
                datum.min = Some(min);
                datum.max = Some(max);
                datum.avg = Some(avg);
            }
        });
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
    use crate::pipeline::sample::SampleBuilder;
    use crate::pipeline::sink::NullSink;

    fn record(ts: i64, value: i64, scale: i64) -> SampleRecord {
        let mut builder = SampleBuilder::new(MetricType::FrequencyThrottle, ts);
        builder.insert(DeviceId(0), MeasurementDatum::new(value, scale, ts));
        builder.build()
    }

    #[test]
    fn half_the_window_throttled_yields_half_scale() {
        let handler = TimeWeightedAverageHandler::new(MetricType::FrequencyThrottle, Arc::new(NullSink));
        handler.pre_handle(record(0, 0, 100));
        handler.handle();
        handler.pre_handle(record(1_000, 500, 100));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 50);
    }

    #[test]
    fn never_exceeds_scale_even_if_active_time_outpaces_wall_time() {
        let handler = TimeWeightedAverageHandler::new(MetricType::FrequencyThrottle, Arc::new(NullSink));
        handler.pre_handle(record(0, 0, 100));
        handler.handle();
        handler.pre_handle(record(1_000, 5_000, 100));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 100);
        assert!(datum.current <= 100);
    }
}
