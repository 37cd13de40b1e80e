//! A scripted, in-memory [`DeviceBackend`] for deterministic tests.
//!
//! Tests push canned raw readings per device/metric and assert on the
//! resulting derived data, with no real GPU required.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::control::command::ConfigParams;
use crate::error::{GpumondError, Result};
use crate::hw::{
    AppliedConfig, ApplyOutcome, ConfigSnapshot, DeviceBackend, DeviceHandle, EnumeratedDevice, ProcessInfo,
    RawActiveTimePair, RawCounter, RawEngineSample, RawFabricSample, RawGauge,
};
use crate::model::{BdfAddress, DeviceCapability, EngineHandle, EngineKind, FabricPortHandle, MetricType, PropertyBag};

type GaugeKey = (DeviceHandle, MetricType, Option<u32>);

pub struct MockBackend {
    devices: Vec<EnumeratedDevice>,
    gauges: Mutex<HashMap<GaugeKey, VecDeque<RawGauge>>>,
    counters: Mutex<HashMap<GaugeKey, VecDeque<RawCounter>>>,
    active_time_pairs: Mutex<HashMap<GaugeKey, VecDeque<RawActiveTimePair>>>,
    engine_samples: Mutex<HashMap<DeviceHandle, VecDeque<Vec<RawEngineSample>>>>,
    fabric_samples: Mutex<HashMap<DeviceHandle, VecDeque<Vec<RawFabricSample>>>>,
    apply_log: Mutex<Vec<DeviceHandle>>,
    applied: Mutex<HashMap<DeviceHandle, AppliedConfig>>,
    processes: HashMap<DeviceHandle, Vec<ProcessInfo>>,
}

impl MockBackend {
    /// `n` generic (non-ATS-like) devices, two tiles each.
    pub fn with_devices(n: u32) -> Self {
        let names: Vec<String> = (0..n).map(|_| "Generic GPU".to_string()).collect();
        Self::with_named_devices(&names)
    }

    /// One device per given `device_name` property value, letting tests
    /// exercise the ATS-like vs. generic engine-group policy split.
    pub fn with_named_devices(names: &[String]) -> Self {
        let devices = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut properties = PropertyBag::new();
                properties.insert("device_name", name.clone());
                properties.insert("num_tiles", "2");
                properties.insert("fabric_id", i.to_string());
                EnumeratedDevice {
                    handle: i as u32,
                    bdf: BdfAddress(format!("0000:00:{:02x}.0", i)),
                    capabilities: all_capabilities(),
                    properties,
                    // `is_aggregate` is a placeholder here: `DeviceRegistry::discover`
                    // overwrites it per the device's `device_name` property.
                    engines: vec![EngineHandle {
                        handle_id: i as u64,
                        kind: EngineKind::Compute,
                        on_subdevice: false,
                        subdevice_id: 0,
                        is_aggregate: false,
                    }],
                    // One link to the next device, so fabric-throughput
                    // tests have a composite id to join against.
                    fabric_ports: vec![FabricPortHandle {
                        attach_id: 0,
                        remote_fabric_id: (i as u32 + 1) % names.len().max(1) as u32,
                        remote_attach_id: 0,
                    }],
                }
            })
            .collect();

        Self {
            devices,
            gauges: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            active_time_pairs: Mutex::new(HashMap::new()),
            engine_samples: Mutex::new(HashMap::new()),
            fabric_samples: Mutex::new(HashMap::new()),
            apply_log: Mutex::new(Vec::new()),
            applied: Mutex::new(HashMap::new()),
            processes: HashMap::new(),
        }
    }

    pub fn push_gauge(&self, handle: DeviceHandle, metric: MetricType, subdevice: Option<u32>, reading: RawGauge) {
        self.gauges
            .lock()
            .unwrap()
            .entry((handle, metric, subdevice))
            .or_default()
            .push_back(reading);
    }

    pub fn push_counter(&self, handle: DeviceHandle, metric: MetricType, subdevice: Option<u32>, reading: RawCounter) {
        self.counters
            .lock()
            .unwrap()
            .entry((handle, metric, subdevice))
            .or_default()
            .push_back(reading);
    }

    pub fn push_active_time_pair(
        &self,
        handle: DeviceHandle,
        metric: MetricType,
        subdevice: Option<u32>,
        reading: RawActiveTimePair,
    ) {
        self.active_time_pairs
            .lock()
            .unwrap()
            .entry((handle, metric, subdevice))
            .or_default()
            .push_back(reading);
    }

    pub fn push_engine_samples(&self, handle: DeviceHandle, samples: Vec<RawEngineSample>) {
        self.engine_samples
            .lock()
            .unwrap()
            .entry(handle)
            .or_default()
            .push_back(samples);
    }

    pub fn push_fabric_samples(&self, handle: DeviceHandle, samples: Vec<RawFabricSample>) {
        self.fabric_samples
            .lock()
            .unwrap()
            .entry(handle)
            .or_default()
            .push_back(samples);
    }

    /// Every device handle `apply` was called for, in call order. Used to
    /// assert that invalid commands never reach the hardware mutator.
    pub fn apply_log(&self) -> Vec<DeviceHandle> {
        self.apply_log.lock().unwrap().clone()
    }
}

fn all_capabilities() -> Vec<DeviceCapability> {
    vec![
        DeviceCapability::PowerLimit,
        DeviceCapability::FrequencyRange,
        DeviceCapability::Standby,
        DeviceCapability::Scheduler,
        DeviceCapability::PerformanceFactor,
        DeviceCapability::FabricPort,
        DeviceCapability::MemoryEcc,
        DeviceCapability::Reset,
    ]
}

impl DeviceBackend for MockBackend {
    fn enumerate_devices(&self) -> Result<Vec<EnumeratedDevice>> {
        Ok(self.devices.clone())
    }

    fn device_properties(&self, handle: DeviceHandle) -> Result<PropertyBag> {
        self.devices
            .get(handle as usize)
            .map(|d| d.properties.clone())
            .ok_or_else(|| GpumondError::DeviceNotFound(handle.to_string()))
    }

    fn engine_handles(&self, handle: DeviceHandle) -> Result<Vec<EngineHandle>> {
        self.devices
            .get(handle as usize)
            .map(|d| d.engines.clone())
            .ok_or_else(|| GpumondError::DeviceNotFound(handle.to_string()))
    }

    fn fabric_port_handles(&self, handle: DeviceHandle) -> Result<Vec<FabricPortHandle>> {
        self.devices
            .get(handle as usize)
            .map(|d| d.fabric_ports.clone())
            .ok_or_else(|| GpumondError::DeviceNotFound(handle.to_string()))
    }

    fn read_gauge(&self, handle: DeviceHandle, metric: MetricType, subdevice: Option<u32>) -> Result<RawGauge> {
        self.gauges
            .lock()
            .unwrap()
            .get_mut(&(handle, metric, subdevice))
            .and_then(|q| q.pop_front())
            .ok_or_else(|| GpumondError::TransientSampleMiss("no scripted gauge reading".into()))
    }

    fn read_counter(&self, handle: DeviceHandle, metric: MetricType, subdevice: Option<u32>) -> Result<RawCounter> {
        self.counters
            .lock()
            .unwrap()
            .get_mut(&(handle, metric, subdevice))
            .and_then(|q| q.pop_front())
            .ok_or_else(|| GpumondError::TransientSampleMiss("no scripted counter reading".into()))
    }

    fn read_active_time_pair(
        &self,
        handle: DeviceHandle,
        metric: MetricType,
        subdevice: Option<u32>,
    ) -> Result<RawActiveTimePair> {
        self.active_time_pairs
            .lock()
            .unwrap()
            .get_mut(&(handle, metric, subdevice))
            .and_then(|q| q.pop_front())
            .ok_or_else(|| GpumondError::TransientSampleMiss("no scripted active-time reading".into()))
    }

    fn read_engine_groups(&self, handle: DeviceHandle) -> Result<Vec<RawEngineSample>> {
        self.engine_samples
            .lock()
            .unwrap()
            .get_mut(&handle)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| GpumondError::TransientSampleMiss("no scripted engine samples".into()))
    }

    fn read_fabric_throughput(&self, handle: DeviceHandle) -> Result<Vec<RawFabricSample>> {
        self.fabric_samples
            .lock()
            .unwrap()
            .get_mut(&handle)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| GpumondError::TransientSampleMiss("no scripted fabric samples".into()))
    }

    fn apply(&self, handle: DeviceHandle, params: &ConfigParams) -> Result<ApplyOutcome> {
        if handle as usize >= self.devices.len() {
            return Err(GpumondError::DeviceNotFound(handle.to_string()));
        }
        self.apply_log.lock().unwrap().push(handle);
        self.applied.lock().unwrap().entry(handle).or_default().record(params);
        Ok(ApplyOutcome::empty())
    }

    fn query_config(&self, handle: DeviceHandle, tile: Option<u32>) -> Result<ConfigSnapshot> {
        if handle as usize >= self.devices.len() {
            return Err(GpumondError::DeviceNotFound(handle.to_string()));
        }
        Ok(self
            .applied
            .lock()
            .unwrap()
            .get(&handle)
            .map(|c| c.snapshot(tile))
            .unwrap_or_default())
    }

    fn reset(&self, handle: DeviceHandle, _force: bool) -> Result<()> {
        if handle as usize >= self.devices.len() {
            return Err(GpumondError::DeviceNotFound(handle.to_string()));
        }
        Ok(())
    }

    fn process_list(&self, handle: DeviceHandle) -> Result<Vec<ProcessInfo>> {
        Ok(self.processes.get(&handle).cloned().unwrap_or_default())
    }
}
