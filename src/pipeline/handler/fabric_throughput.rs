//! Fabric-throughput handler, for the one counter-kind metric whose raw
//! reading isn't a single per-device scalar: each device can have several
//! fabric ports, each reporting a received and a transmitted byte counter,
//! and the two sides of a link must stay distinguishable from each other.
//!
//! Samples arrive keyed by the composite `fabric_id` computed by
//! [`crate::model::encode_fabric_throughput_id`] (joining `attach_id`,
//! `remote_fabric_id`, `remote_attach_id`, and direction), carried in
//! [`ExtendedDatum::FabricSamples`]. Each port's rate is derived the same
//! way [`super::counter_rate::CounterRateHandler`] derives a single
//! counter's rate, then summed into `current` as the device's aggregate
//! fabric throughput; the per-port rate is also kept, indexed by port
//! ordinal, in `subdevices` so a caller can still see the individual ports.
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{DeviceId, ExtendedDatum, FabricSample, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

use super::stats::{delta_value, record_stat, HandlerBase, SessionId, US_PER_SEC};
use super::DataHandler;

pub struct FabricThroughputHandler {
    base: HandlerBase,
}

impl FabricThroughputHandler {
    pub fn new(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            base: HandlerBase::new(metric_type, sink),
        }
    }
}

impl DataHandler for FabricThroughputHandler {
    fn metric_type(&self) -> MetricType {
        self.base.metric_type()
    }

    fn pre_handle(&self, record: SampleRecord) {
        self.base.pre_handle(record);
    }

    fn handle(&self) {
        self.base.with_derivation(|previous, data, sessions| {
            for (device_id, datum) in data.iter_mut() {
                let samples = match &datum.extended {
                    Some(ExtendedDatum::FabricSamples(samples)) => samples.clone(),
                    _ => continue,
                };
                let prev_by_id: HashMap<u64, FabricSample> = previous
                    .and_then(|p| p.data.get(device_id))
                    .and_then(|d| match &d.extended {
                        Some(ExtendedDatum::FabricSamples(s)) => Some(s.iter().map(|f| (f.fabric_id, *f)).collect()),
                        _ => None,
                    })
                    .unwrap_or_default();

                let mut total_rate = 0i64;
                let mut total_accumulated = 0i64;
                for (ordinal, sample) in samples.iter().enumerate() {
                    total_accumulated += sample.value;
                    let Some(prev) = prev_by_id.get(&sample.fabric_id) else {
                        continue;
                    };
                    let delta_t = sample.timestamp_us - prev.timestamp_us;
                    let Some(delta) = delta_value(Some(prev.value), sample.value, delta_t) else {
                        continue;
                    };
                    let rate = delta * US_PER_SEC / delta_t;
                    total_rate += rate;
                    datum.set_subdevice_current(ordinal as u32, rate);
                }

                datum.current = total_rate;
                datum.accumulated = Some(total_accumulated);
                let (min, max, avg) = record_stat(sessions, *device_id, total_rate);
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
    use crate::model::MeasurementDatum;
    use crate::pipeline::sample::SampleBuilder;
    use crate::pipeline::sink::NullSink;

    fn record_with_ports(ts: i64, samples: Vec<FabricSample>) -> SampleRecord {
        let mut builder = SampleBuilder::new(MetricType::FabricThroughput, ts);
        let mut datum = MeasurementDatum::new(0, 1, ts);
        datum.extended = Some(ExtendedDatum::FabricSamples(samples));
        builder.insert(DeviceId(0), datum);
        builder.build()
    }

    #[test]
    fn two_ports_keep_distinct_rates_and_sum_into_current() {
        let handler = FabricThroughputHandler::new(MetricType::FabricThroughput, Arc::new(NullSink));
        handler.pre_handle(record_with_ports(
            0,
            vec![
                FabricSample { fabric_id: 10, value: 0, timestamp_us: 0 },
                FabricSample { fabric_id: 20, value: 0, timestamp_us: 0 },
            ],
        ));
        handler.handle();
        handler.pre_handle(record_with_ports(
            1_000_000,
            vec![
                FabricSample { fabric_id: 10, value: 1_000, timestamp_us: 1_000_000 },
                FabricSample { fabric_id: 20, value: 5_000, timestamp_us: 1_000_000 },
            ],
        ));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.subdevice_current(0), Some(1_000));
        assert_eq!(datum.subdevice_current(1), Some(5_000));
        assert_eq!(datum.current, 6_000);
    }

    #[test]
    fn a_link_dropping_out_does_not_poison_the_surviving_link() {
        let handler = FabricThroughputHandler::new(MetricType::FabricThroughput, Arc::new(NullSink));
        handler.pre_handle(record_with_ports(
            0,
            vec![
                FabricSample { fabric_id: 10, value: 0, timestamp_us: 0 },
                FabricSample { fabric_id: 20, value: 0, timestamp_us: 0 },
            ],
        ));
        handler.handle();
        // Port 20 vanishes this tick (link down); port 10 still advances.
        handler.pre_handle(record_with_ports(
            1_000_000,
            vec![FabricSample { fabric_id: 10, value: 2_000, timestamp_us: 1_000_000 }],
        ));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 2_000);
    }
}
