//! Assembly of one tick's [`SampleRecord`] by a sampling loop.
//!
//! A sampler never constructs a `SampleRecord` field-by-field; it
//! accumulates per-device datums into a [`SampleBuilder`] as it walks the
//! device set, then publishes the finished, immutable record.

use std::collections::BTreeMap;

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};

pub struct SampleBuilder {
    metric_type: MetricType,
    sampled_at_us: i64,
    data: BTreeMap<DeviceId, MeasurementDatum>,
}

impl SampleBuilder {
    pub fn new(metric_type: MetricType, sampled_at_us: i64) -> Self {
        Self {
            metric_type,
            sampled_at_us,
            data: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, device_id: DeviceId, mut datum: MeasurementDatum) {
        datum.timestamp_us = self.sampled_at_us;
        self.data.insert(device_id, datum);
    }

    pub fn build(self) -> SampleRecord {
        SampleRecord {
            metric_type: self.metric_type,
            sampled_at_us: self.sampled_at_us,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stamps_insert_timestamp_to_record_time() {
        let mut builder = SampleBuilder::new(MetricType::Power, 42);
        builder.insert(DeviceId(0), MeasurementDatum::new(100, 1, 0));
        let record = builder.build();
        assert_eq!(record.data[&DeviceId(0)].timestamp_us, 42);
        assert_eq!(record.sampled_at_us, 42);
    }
}
