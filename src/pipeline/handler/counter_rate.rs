//! Counter-rate handler, for counter-kind metrics (energy, PCIe bytes,
//! RAS error counts, ...).
//!
//! Each tick's raw accumulator reading arrives as `datum.current`; the
//! previous tick's raw reading is recovered from `datum.accumulated`
//! (stamped by this same handler one tick earlier), so the handler never
//! needs a side channel to remember the last raw value.

use std::sync::Arc;

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

use super::stats::{delta_value, record_stat, HandlerBase, SessionId, US_PER_SEC};
use super::DataHandler;

pub struct CounterRateHandler {
    base: HandlerBase,
}

impl CounterRateHandler {
    pub fn new(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            base: HandlerBase::new(metric_type, sink),
        }
    }
}

impl DataHandler for CounterRateHandler {
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
                let prev_datum = previous.and_then(|p| p.data.get(device_id));
                let delta_t = prev_datum.map(|p| datum.timestamp_us - p.timestamp_us);
                let previous_raw = prev_datum.map(|p| p.accumulated.unwrap_or(p.current));

                let derived = delta_t.and_then(|dt| delta_value(previous_raw, raw_now, dt).map(|dv| (dv, dt)));

                datum.current = match derived {
                    Some((delta, dt)) => delta * US_PER_SEC / dt,
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
