//! The sink-facing query API: snapshot lookup by device, and the
//! composite per-device snapshot assembled across every registered
//! handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::model::{DeviceId, MetricType};
use crate::pipeline::handler::DataHandler;

#[derive(Debug, Clone, Serialize)]
pub struct SubdeviceSnapshot {
    pub subdevice_id: u32,
    pub value: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub avg: Option<i64>,
    pub accumulated: Option<i64>,
    pub timestamp_us: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub value: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub avg: Option<i64>,
    pub accumulated: Option<i64>,
    pub scale: i64,
    pub timestamp_us: i64,
    pub subdevices: Vec<SubdeviceSnapshot>,
}

/// The outward, serializable per-device record. Produced only at the
/// query boundary — internal code always passes typed `MeasurementDatum`s.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub device_id: DeviceId,
    pub num_subdevices: u32,
    pub per_metric: BTreeMap<MetricType, MetricSnapshot>,
}

/// Assembles a device's snapshot by taking each handler's mutex in turn,
/// one at a time — never holding two at once, so this never blocks a
/// sampling thread for longer than a single handler's own atomic read.
pub fn snapshot(device_id: DeviceId, num_subdevices: u32, handlers: &[Arc<dyn DataHandler>]) -> Snapshot {
    let mut per_metric = BTreeMap::new();
    for handler in handlers {
        if let Some(datum) = handler.latest_for(device_id) {
            let subdevices = datum
                .subdevices
                .iter()
                .map(|(&subdevice_id, d)| SubdeviceSnapshot {
                    subdevice_id,
                    value: d.current,
                    min: d.min,
                    max: d.max,
                    avg: d.avg,
                    accumulated: d.accumulated,
                    timestamp_us: d.timestamp_us,
                })
                .collect();
            per_metric.insert(
                handler.metric_type(),
                MetricSnapshot {
                    value: datum.current,
                    min: datum.min,
                    max: datum.max,
                    avg: datum.avg,
                    accumulated: datum.accumulated,
                    scale: datum.scale,
                    timestamp_us: datum.timestamp_us,
                    subdevices,
                },
            );
        }
    }
    Snapshot {
        device_id,
        num_subdevices,
        per_metric,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::MeasurementDatum;
    use crate::pipeline::handler::PassthroughHandler;
    use crate::pipeline::sample::SampleBuilder;
    use crate::pipeline::sink::NullSink;

    #[test]
    fn snapshot_includes_every_handler_with_data_for_the_device() {
        let power = PassthroughHandler::new(MetricType::Power, Arc::new(NullSink));
        let mut builder = SampleBuilder::new(MetricType::Power, 10);
        builder.insert(DeviceId(0), MeasurementDatum::new(150, 1, 10));
        power.pre_handle(builder.build());
        power.handle();

        let temp = PassthroughHandler::new(MetricType::GpuTemperature, Arc::new(NullSink));
        // No sample pushed for device 0 — it must simply be absent, not an error.

        let handlers: Vec<Arc<dyn DataHandler>> = vec![Arc::new(power), Arc::new(temp)];
        let snap = snapshot(DeviceId(0), 1, &handlers);

        assert!(snap.per_metric.contains_key(&MetricType::Power));
        assert!(!snap.per_metric.contains_key(&MetricType::GpuTemperature));
        assert_eq!(snap.per_metric[&MetricType::Power].value, 150);
    }
}
