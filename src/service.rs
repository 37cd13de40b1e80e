//! The explicit `Service` value: discovers devices, wires a handler and
//! sampling loop per configured metric type, and exposes the config
//! command surface and snapshot query over them.
//!
//! Replaces the source's process-wide singletons (global device list,
//! global handler registry) with one value created at startup and
//! threaded into every caller, per the Design Note on global mutable
//! state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::control::command::{self, CommandResult};
use crate::device::DeviceRegistry;
use crate::error::Result;
use crate::hw::DeviceBackend;
use crate::model::{DeviceId, EngineKind, MetricKind, MetricType};
use crate::pipeline::handler::{
    CounterRateHandler, DataHandler, EngineGroupHandler, FabricThroughputHandler, PassthroughHandler,
    TimeWeightedAverageHandler,
};
use crate::pipeline::query::{self, Snapshot};
use crate::pipeline::sink::PersistenceSink;
use crate::pipeline::loop_::SamplingLoop;
use crate::settings::Settings;

/// Builds the handler for a `Derived`-kind metric type. The five
/// `EngineGroup*AllUtilization` variants filter to one engine kind;
/// `Computation` aggregates every engine on the device regardless of
/// kind. `EuActive`/`EuStall`/`EuIdle`/`EngineUtilization` have no handler
/// — see the module doc on [`crate::pipeline::handler::engine_group`] for
/// why they're out of scope.
fn build_derived_handler(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Option<Arc<dyn DataHandler>> {
    if metric_type == MetricType::Computation {
        return Some(Arc::new(EngineGroupHandler::new(metric_type, None, sink)));
    }
    let engine_kind: EngineKind = EngineGroupHandler::engine_kind_for(metric_type)?;
    Some(Arc::new(EngineGroupHandler::new(metric_type, Some(engine_kind), sink)))
}

/// Builds the handler for a `Counter`-kind metric type. `FabricThroughput`
/// is the one counter whose raw reading is several per-port values rather
/// than a single device scalar, so it gets its own port-aware handler
/// instead of the generic single-value rate derivation.
fn build_counter_handler(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Arc<dyn DataHandler> {
    if metric_type == MetricType::FabricThroughput {
        return Arc::new(FabricThroughputHandler::new(metric_type, sink));
    }
    Arc::new(CounterRateHandler::new(metric_type, sink))
}

fn build_handler(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Option<Arc<dyn DataHandler>> {
    match metric_type.kind() {
        MetricKind::Gauge => Some(Arc::new(PassthroughHandler::new(metric_type, sink))),
        MetricKind::Counter => Some(build_counter_handler(metric_type, sink)),
        MetricKind::ActiveTimePair => Some(Arc::new(TimeWeightedAverageHandler::new(metric_type, sink))),
        MetricKind::Derived => build_derived_handler(metric_type, sink),
    }
}

pub struct Service {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    handlers: BTreeMap<MetricType, Arc<dyn DataHandler>>,
    loops: Vec<SamplingLoop>,
}

impl Service {
    /// Discovers devices through `backend`, builds the handler family for
    /// every metric type named in `settings`, and spawns their sampling
    /// loops.
    pub fn start(backend: Arc<dyn DeviceBackend>, settings: &Settings, sink: Arc<dyn PersistenceSink>) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::discover(backend.as_ref())?);

        let mut handlers = BTreeMap::new();
        let mut loops = Vec::new();

        for (&metric_type, &period_ms) in &settings.sampling_period_ms {
            let Some(handler) = build_handler(metric_type, Arc::clone(&sink)) else {
                tracing::warn!(?metric_type, "no handler variant for this metric type; skipping");
                continue;
            };
            let period = std::time::Duration::from_millis(period_ms);
            loops.push(SamplingLoop::spawn(
                metric_type,
                Arc::clone(&registry),
                Arc::clone(&backend),
                Arc::clone(&handler),
                period,
            ));
            handlers.insert(metric_type, handler);
        }

        Ok(Self {
            registry,
            backend,
            handlers,
            loops,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Requests shutdown of every sampling loop and blocks until each
    /// has exited at its next tick boundary.
    pub fn shutdown(&mut self) {
        self.loops.clear();
    }

    pub fn snapshot(&self, device_id: DeviceId) -> Option<Snapshot> {
        let device = self.registry.get(device_id)?;
        let handlers: Vec<Arc<dyn DataHandler>> = self.handlers.values().cloned().collect();
        Some(query::snapshot(device_id, device.properties.num_tiles(), &handlers))
    }

    pub fn query(&self, device: &str, tile: Option<u32>) -> CommandResult {
        command::query(&self.registry, self.backend.as_ref(), device, tile)
    }

    pub fn set_power_limit(&self, device: &str, watts_and_interval: &str) -> CommandResult {
        command::set_power_limit(&self.registry, self.backend.as_ref(), device, watts_and_interval)
    }

    pub fn set_frequency_range(&self, device: &str, tile: i64, min_max: &str) -> CommandResult {
        command::set_frequency_range(&self.registry, self.backend.as_ref(), device, tile, min_max)
    }

    pub fn set_standby(&self, device: &str, tile: i64, mode: &str) -> CommandResult {
        command::set_standby(&self.registry, self.backend.as_ref(), device, tile, mode)
    }

    pub fn set_scheduler(&self, device: &str, tile: i64, spec: &str) -> CommandResult {
        command::set_scheduler(&self.registry, self.backend.as_ref(), device, tile, spec)
    }

    pub fn set_performance_factor(&self, device: &str, tile: i64, engine_and_value: &str) -> CommandResult {
        command::set_performance_factor(&self.registry, self.backend.as_ref(), device, tile, engine_and_value)
    }

    pub fn set_fabric_port(&self, device: &str, tile: i64, port_and_enabled: &str) -> CommandResult {
        command::set_fabric_port(&self.registry, self.backend.as_ref(), device, tile, port_and_enabled)
    }

    pub fn set_fabric_beaconing(&self, device: &str, tile: i64, port_and_on: &str) -> CommandResult {
        command::set_fabric_beaconing(&self.registry, self.backend.as_ref(), device, tile, port_and_on)
    }

    pub fn set_memory_ecc(&self, device: &str, value: &str) -> CommandResult {
        command::set_memory_ecc(&self.registry, self.backend.as_ref(), device, value)
    }

    pub fn reset_device(&self, device: &str, confirmed: bool) -> CommandResult {
        command::reset_device(&self.registry, self.backend.as_ref(), device, confirmed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::test_util::MockBackend;
    use crate::pipeline::sink::NullSink;

    #[test]
    fn start_discovers_devices_and_spawns_configured_loops() {
        let backend = Arc::new(MockBackend::with_devices(2));
        let mut settings = Settings::default();
        settings.sampling_period_ms.retain(|m, _| *m == MetricType::GpuTemperature);

        let service = Service::start(backend, &settings, Arc::new(NullSink)).unwrap();
        assert_eq!(service.registry().len(), 2);
        assert_eq!(service.handlers.len(), 1);
    }

    #[test]
    fn unknown_device_query_reports_error_not_panic() {
        let backend = Arc::new(MockBackend::with_devices(1));
        let settings = Settings {
            sampling_period_ms: BTreeMap::new(),
            ..Settings::default()
        };
        let service = Service::start(backend, &settings, Arc::new(NullSink)).unwrap();
        let result = service.query("99", None);
        assert_eq!(result.status, command::CommandStatus::Error);
    }

    #[test]
    fn fabric_throughput_gets_a_fabric_throughput_handler_not_a_counter_rate_handler() {
        use crate::model::{ExtendedDatum, FabricSample, MeasurementDatum};
        use crate::pipeline::sample::SampleBuilder;

        let handler = build_handler(MetricType::FabricThroughput, Arc::new(NullSink)).unwrap();

        let tick = |ts: i64, a: i64, b: i64| {
            let mut builder = SampleBuilder::new(MetricType::FabricThroughput, ts);
            let mut datum = MeasurementDatum::new(0, 1, ts);
            datum.extended = Some(ExtendedDatum::FabricSamples(vec![
                FabricSample { fabric_id: 10, value: a, timestamp_us: ts },
                FabricSample { fabric_id: 20, value: b, timestamp_us: ts },
            ]));
            builder.insert(DeviceId(0), datum);
            builder.build()
        };

        handler.pre_handle(tick(0, 0, 0));
        handler.handle();
        handler.pre_handle(tick(1_000_000, 1_000, 5_000));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        // A CounterRateHandler would ignore `extended` and report 0; only
        // the fabric-aware handler sums per-port rates into `current`.
        assert_eq!(datum.current, 6_000);
    }

    #[test]
    fn shutdown_clears_loops() {
        let backend = Arc::new(MockBackend::with_devices(1));
        let settings = Settings {
            sampling_period_ms: BTreeMap::new(),
            ..Settings::default()
        };
        let mut service = Service::start(backend, &settings, Arc::new(NullSink)).unwrap();
        service.shutdown();
        assert!(service.loops.is_empty());
    }
}
