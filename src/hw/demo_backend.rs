//! A deterministic, synthetic [`DeviceBackend`].
//!
//! The hardware-sysman binding is an external collaborator this crate
//! only specifies the trait for (§1 of the design notes); there is no
//! real GPU backend shipped here. This is what the CLI runs against by
//! default so `discovery`/`config`/`health`/`stats` are exercisable
//! end-to-end without real hardware. It is not test scaffolding — see
//! [`crate::hw::test_util`] for that — it ships in the release binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::control::command::ConfigParams;
use crate::error::{GpumondError, Result};
use crate::hw::{
    AppliedConfig, ApplyOutcome, ConfigSnapshot, DeviceBackend, DeviceHandle, EnumeratedDevice, ProcessInfo,
    RawActiveTimePair, RawCounter, RawEngineSample, RawFabricSample, RawGauge,
};
use crate::model::{BdfAddress, DeviceCapability, EngineHandle, EngineKind, FabricDirection, FabricPortHandle, PropertyBag};

/// `n` identical, non-ATS-like devices with two tiles and one compute
/// engine each, reporting a fixed temperature/power and a monotonically
/// increasing energy counter and engine active time.
pub struct DemoBackend {
    devices: Vec<EnumeratedDevice>,
    tick_us: AtomicI64,
    applied: Mutex<HashMap<DeviceHandle, AppliedConfig>>,
}

impl DemoBackend {
    pub fn new(n: u32) -> Self {
        let devices = (0..n)
            .map(|i| {
                let mut properties = PropertyBag::new();
                properties.insert("device_name", "Demo GPU".to_string());
                properties.insert("num_tiles", "2");
                properties.insert("fabric_id", i.to_string());
                EnumeratedDevice {
                    handle: i,
                    bdf: BdfAddress(format!("0000:00:{i:02x}.0")),
                    capabilities: all_capabilities(),
                    properties,
                    engines: vec![EngineHandle {
                        handle_id: i as u64,
                        kind: EngineKind::Compute,
                        on_subdevice: false,
                        subdevice_id: 0,
                        is_aggregate: false,
                    }],
                    // One link to the next device in the ring (or to
                    // itself, for a single-device demo).
                    fabric_ports: vec![FabricPortHandle {
                        attach_id: 0,
                        remote_fabric_id: (i + 1) % n.max(1),
                        remote_attach_id: 0,
                    }],
                }
            })
            .collect();
        Self {
            devices,
            tick_us: AtomicI64::new(0),
            applied: Mutex::new(HashMap::new()),
        }
    }

    fn device(&self, handle: DeviceHandle) -> Result<&EnumeratedDevice> {
        self.devices
            .get(handle as usize)
            .ok_or_else(|| GpumondError::DeviceNotFound(handle.to_string()))
    }

    fn now_us(&self) -> i64 {
        self.tick_us.fetch_add(1_000_000, Ordering::Relaxed)
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

impl DeviceBackend for DemoBackend {
    fn enumerate_devices(&self) -> Result<Vec<EnumeratedDevice>> {
        Ok(self.devices.clone())
    }

    fn device_properties(&self, handle: DeviceHandle) -> Result<PropertyBag> {
        Ok(self.device(handle)?.properties.clone())
    }

    fn engine_handles(&self, handle: DeviceHandle) -> Result<Vec<EngineHandle>> {
        Ok(self.device(handle)?.engines.clone())
    }

    fn fabric_port_handles(&self, handle: DeviceHandle) -> Result<Vec<FabricPortHandle>> {
        Ok(self.device(handle)?.fabric_ports.clone())
    }

    fn read_gauge(&self, handle: DeviceHandle, metric: crate::model::MetricType, _subdevice: Option<u32>) -> Result<RawGauge> {
        self.device(handle)?;
        let value = match metric {
            crate::model::MetricType::GpuTemperature | crate::model::MetricType::MemoryTemperature => 55,
            crate::model::MetricType::Power => 120,
            _ => 0,
        };
        Ok(RawGauge { value, timestamp_us: self.now_us() })
    }

    fn read_counter(&self, handle: DeviceHandle, _metric: crate::model::MetricType, _subdevice: Option<u32>) -> Result<RawCounter> {
        let ts = self.now_us();
        self.device(handle)?;
        Ok(RawCounter { value: ts, timestamp_us: ts })
    }

    fn read_active_time_pair(
        &self,
        handle: DeviceHandle,
        _metric: crate::model::MetricType,
        _subdevice: Option<u32>,
    ) -> Result<RawActiveTimePair> {
        let ts = self.now_us();
        self.device(handle)?;
        Ok(RawActiveTimePair { active_time_us: ts / 2, timestamp_us: ts })
    }

    fn read_engine_groups(&self, handle: DeviceHandle) -> Result<Vec<RawEngineSample>> {
        let device = self.device(handle)?;
        let ts = self.now_us();
        Ok(device
            .engines
            .iter()
            .map(|e| RawEngineSample {
                handle_id: e.handle_id,
                active_time_us: ts / 2,
                timestamp_us: ts,
            })
            .collect())
    }

    fn read_fabric_throughput(&self, handle: DeviceHandle) -> Result<Vec<RawFabricSample>> {
        let device = self.device(handle)?;
        let ts = self.now_us();
        Ok(device
            .fabric_ports
            .iter()
            .flat_map(|port| {
                [FabricDirection::Received, FabricDirection::Transmitted].map(|direction| RawFabricSample {
                    attach_id: port.attach_id,
                    direction,
                    value: ts,
                    timestamp_us: ts,
                })
            })
            .collect())
    }

    fn apply(&self, handle: DeviceHandle, params: &ConfigParams) -> Result<ApplyOutcome> {
        self.device(handle)?;
        self.applied.lock().unwrap().entry(handle).or_default().record(params);
        Ok(ApplyOutcome::empty())
    }

    fn query_config(&self, handle: DeviceHandle, tile: Option<u32>) -> Result<ConfigSnapshot> {
        self.device(handle)?;
        Ok(self
            .applied
            .lock()
            .unwrap()
            .get(&handle)
            .map(|c| c.snapshot(tile))
            .unwrap_or_default())
    }

    fn reset(&self, handle: DeviceHandle, _force: bool) -> Result<()> {
        self.device(handle)?;
        Ok(())
    }

    fn process_list(&self, handle: DeviceHandle) -> Result<Vec<ProcessInfo>> {
        self.device(handle)?;
        Ok(vec![])
    }
}
