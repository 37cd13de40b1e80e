//! The sampling loop: one OS thread per enabled metric type, ticking at
//! a configured period and feeding its bound handler.
//!
//! Grounded on the thread/mutex/shutdown-flag idiom of a native
//! collector loop rather than any async runtime — matching the blocking,
//! synchronous style the rest of this crate uses throughout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::device::DeviceRegistry;
use crate::hw::DeviceBackend;
use crate::model::{
    encode_fabric_throughput_id, EngineSample, ExtendedDatum, FabricSample, MeasurementDatum, MetricKind, MetricType,
    SampleRecord, DEFAULT_SCALE,
};
use crate::pipeline::handler::DataHandler;
use crate::pipeline::sample::SampleBuilder;

/// Joins raw engine-activity readings against a device's static engine
/// topology to produce the enriched samples the engine-group handler
/// needs (kind, subdevice, aggregate-ness).
fn build_engine_samples(
    raw: Vec<crate::hw::RawEngineSample>,
    engines: &[crate::model::EngineHandle],
) -> Vec<EngineSample> {
    raw.into_iter()
        .filter_map(|r| {
            let topology = engines.iter().find(|e| e.handle_id == r.handle_id)?;
            Some(EngineSample {
                handle_id: r.handle_id,
                engine_kind: topology.kind,
                on_subdevice: topology.on_subdevice,
                subdevice_id: topology.subdevice_id,
                active_time_us: r.active_time_us,
                timestamp_us: r.timestamp_us,
                is_aggregate: topology.is_aggregate,
            })
        })
        .collect()
}

/// Joins raw fabric-port readings against a device's static fabric-port
/// topology to compute each one's composite `fabric_id`, so two sides of
/// the same link stay distinguishable from every other port on the device.
fn build_fabric_samples(
    raw: Vec<crate::hw::RawFabricSample>,
    fabric_ports: &[crate::model::FabricPortHandle],
) -> Vec<FabricSample> {
    raw.into_iter()
        .filter_map(|r| {
            let port = fabric_ports.iter().find(|p| p.attach_id == r.attach_id)?;
            Some(FabricSample {
                fabric_id: encode_fabric_throughput_id(port.attach_id, port.remote_fabric_id, port.remote_attach_id, r.direction),
                value: r.value,
                timestamp_us: r.timestamp_us,
            })
        })
        .collect()
}

fn sample_metric(
    metric_type: MetricType,
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    ts_us: i64,
) -> SampleRecord {
    let mut builder = SampleBuilder::new(metric_type, ts_us);
    for device in registry.iter() {
        // Fabric throughput is counter-kind but not a single per-device
        // scalar: a device can have several fabric ports, each with a
        // received and a transmitted counter, so it needs its own
        // port-aware read path rather than the generic counter branch.
        if metric_type == MetricType::FabricThroughput {
            match backend.read_fabric_throughput(device.handle) {
                Ok(raw) => {
                    let samples = build_fabric_samples(raw, &device.fabric_ports);
                    let mut datum = MeasurementDatum::new(0, 1, ts_us);
                    datum.extended = Some(ExtendedDatum::FabricSamples(samples));
                    builder.insert(device.id, datum);
                }
                Err(e) => tracing::debug!(error = %e, ?metric_type, device = %device.id, "fabric sample read skipped"),
            }
            continue;
        }
        match metric_type.kind() {
            MetricKind::Gauge => match backend.read_gauge(device.handle, metric_type, None) {
                Ok(raw) => builder.insert(device.id, MeasurementDatum::new(raw.value, DEFAULT_SCALE, ts_us)),
                Err(e) => tracing::debug!(error = %e, ?metric_type, device = %device.id, "gauge read skipped"),
            },
            MetricKind::Counter => match backend.read_counter(device.handle, metric_type, None) {
                Ok(raw) => builder.insert(device.id, MeasurementDatum::new(raw.value, 1, ts_us)),
                Err(e) => tracing::debug!(error = %e, ?metric_type, device = %device.id, "counter read skipped"),
            },
            MetricKind::ActiveTimePair => match backend.read_active_time_pair(device.handle, metric_type, None) {
                Ok(raw) => builder.insert(
                    device.id,
                    MeasurementDatum::new(raw.active_time_us, DEFAULT_SCALE, ts_us),
                ),
                Err(e) => tracing::debug!(error = %e, ?metric_type, device = %device.id, "active-time read skipped"),
            },
            MetricKind::Derived => match backend.read_engine_groups(device.handle) {
                Ok(raw) => {
                    let samples = build_engine_samples(raw, &device.engines);
                    let mut datum = MeasurementDatum::new(0, DEFAULT_SCALE, ts_us);
                    datum.extended = Some(ExtendedDatum::EngineSamples(samples));
                    builder.insert(device.id, datum);
                }
                Err(e) => tracing::debug!(error = %e, ?metric_type, device = %device.id, "engine sample read skipped"),
            },
        }
    }
    builder.build()
}

/// A running sampling loop for one metric type. Dropping it requests
/// shutdown and joins the thread.
pub struct SamplingLoop {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SamplingLoop {
    pub fn spawn(
        metric_type: MetricType,
        registry: Arc<DeviceRegistry>,
        backend: Arc<dyn DeviceBackend>,
        handler: Arc<dyn DataHandler>,
        period: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_loop = Arc::clone(&shutdown);
        let start = Instant::now();

        let handle = thread::spawn(move || {
            while !shutdown_loop.load(Ordering::Relaxed) {
                let tick_start = Instant::now();
                let ts_us = start.elapsed().as_micros() as i64;
                let record = sample_metric(metric_type, &registry, backend.as_ref(), ts_us);
                handler.pre_handle(record);
                handler.handle();

                let elapsed = tick_start.elapsed();
                if elapsed < period {
                    thread::sleep(period - elapsed);
                }
            }
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Requests shutdown without blocking; the loop exits at its next
    /// tick boundary.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::test_util::MockBackend;
    use crate::model::DeviceId;
    use crate::pipeline::handler::PassthroughHandler;
    use crate::pipeline::sink::NullSink;

    #[test]
    fn sample_metric_skips_devices_with_no_scripted_reading() {
        let backend = MockBackend::with_devices(1);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        let record = sample_metric(MetricType::GpuTemperature, &registry, &backend, 0);
        assert!(record.data.is_empty());
    }

    #[test]
    fn sample_metric_reads_scripted_gauge() {
        let backend = MockBackend::with_devices(1);
        backend.push_gauge(0, MetricType::GpuTemperature, None, crate::hw::RawGauge { value: 55, timestamp_us: 0 });
        let registry = DeviceRegistry::discover(&backend).unwrap();
        let record = sample_metric(MetricType::GpuTemperature, &registry, &backend, 100);
        assert_eq!(record.data[&DeviceId(0)].current, 55);
    }

    #[test]
    fn fabric_throughput_is_sampled_per_port_not_as_a_flat_scalar() {
        let backend = MockBackend::with_devices(1);
        backend.push_fabric_samples(
            0,
            vec![
                crate::hw::RawFabricSample {
                    attach_id: 0,
                    direction: crate::model::FabricDirection::Received,
                    value: 100,
                    timestamp_us: 0,
                },
                crate::hw::RawFabricSample {
                    attach_id: 0,
                    direction: crate::model::FabricDirection::Transmitted,
                    value: 200,
                    timestamp_us: 0,
                },
            ],
        );
        let registry = DeviceRegistry::discover(&backend).unwrap();
        let record = sample_metric(MetricType::FabricThroughput, &registry, &backend, 0);

        let samples = match &record.data[&DeviceId(0)].extended {
            Some(ExtendedDatum::FabricSamples(samples)) => samples.clone(),
            other => panic!("expected fabric samples, got {other:?}"),
        };
        assert_eq!(samples.len(), 2);
        assert_ne!(samples[0].fabric_id, samples[1].fabric_id);
    }

    #[test]
    fn loop_runs_until_shutdown_and_publishes_at_least_one_tick() {
        let backend = Arc::new(MockBackend::with_devices(1));
        for _ in 0..20 {
            backend.push_gauge(0, MetricType::GpuTemperature, None, crate::hw::RawGauge { value: 42, timestamp_us: 0 });
        }
        let registry = Arc::new(DeviceRegistry::discover(backend.as_ref()).unwrap());
        let handler: Arc<dyn DataHandler> = Arc::new(PassthroughHandler::new(MetricType::GpuTemperature, Arc::new(NullSink)));

        let sampling_loop = SamplingLoop::spawn(
            MetricType::GpuTemperature,
            registry,
            backend as Arc<dyn DeviceBackend>,
            Arc::clone(&handler),
            Duration::from_millis(1),
        );
        thread::sleep(Duration::from_millis(20));
        sampling_loop.request_shutdown();
        drop(sampling_loop);

        assert!(handler.latest_for(DeviceId(0)).is_some());
    }
}
