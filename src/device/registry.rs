//! Device registry.
//!
//! Populated once at startup from the hardware-sysman enumeration and
//! treated as immutable afterwards (hot-unplug is only observed, never
//! acted on by the registry itself — a sampling loop that notices a
//! device has vanished simply drops it from the next sample, per the
//! pipeline's invariants).

use std::collections::HashMap;

use crate::hw::{DeviceBackend, DeviceHandle, EnumeratedDevice};
use crate::model::{BdfAddress, DeviceCapability, DeviceId, EngineHandle, FabricPortHandle, PropertyBag};
use crate::pipeline::handler::engine_group::is_ats_like;

/// A registered device: its stable ID, hardware handle, and topology.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub handle: DeviceHandle,
    pub bdf: BdfAddress,
    pub capabilities: Vec<DeviceCapability>,
    pub properties: PropertyBag,
    pub engines: Vec<EngineHandle>,
    pub fabric_ports: Vec<FabricPortHandle>,
}

impl Device {
    pub fn has_capability(&self, cap: &DeviceCapability) -> bool {
        self.capabilities.contains(cap)
    }
}

/// O(1) lookup by assignment-order ID and by BDF address.
pub struct DeviceRegistry {
    devices: Vec<Device>,
    by_bdf: HashMap<BdfAddress, usize>,
}

impl DeviceRegistry {
    /// Enumerate devices through the backend and assign IDs in discovery
    /// order, starting at 0.
    ///
    /// The engine-group aggregate-vs-per-engine policy (`spec.md` §4.C:
    /// "The policy choice is made by inspecting a device property")
    /// is decided here, once, from each device's `device_name` property,
    /// and stamped onto every engine handle's `is_aggregate` field so the
    /// sampling loop and `EngineGroupHandler` downstream only ever react to
    /// topology the registry already resolved — a backend's own handles
    /// need not agree with each other on aggregate-ness.
    pub fn discover(backend: &dyn DeviceBackend) -> crate::error::Result<Self> {
        let enumerated: Vec<EnumeratedDevice> = backend.enumerate_devices()?;
        let mut devices = Vec::with_capacity(enumerated.len());
        let mut by_bdf = HashMap::with_capacity(enumerated.len());

        for (idx, e) in enumerated.into_iter().enumerate() {
            let id = DeviceId(idx as u32);
            by_bdf.insert(e.bdf.clone(), idx);
            let ats_like = e.properties.device_name().map(is_ats_like).unwrap_or(false);
            let engines = e
                .engines
                .into_iter()
                .map(|engine| EngineHandle { is_aggregate: ats_like, ..engine })
                .collect();
            devices.push(Device {
                id,
                handle: e.handle,
                bdf: e.bdf,
                capabilities: e.capabilities,
                properties: e.properties,
                engines,
                fabric_ports: e.fabric_ports,
            });
        }

        Ok(Self { devices, by_bdf })
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.0 as usize)
    }

    pub fn get_by_bdf(&self, bdf: &BdfAddress) -> Option<&Device> {
        self.by_bdf.get(bdf).and_then(|&idx| self.devices.get(idx))
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::test_util::MockBackend;

    #[test]
    fn discovers_devices_in_order_and_indexes_bdf() {
        let backend = MockBackend::with_devices(3);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(DeviceId(0)).unwrap().id, DeviceId(0));
        let bdf = registry.get(DeviceId(1)).unwrap().bdf.clone();
        assert_eq!(registry.get_by_bdf(&bdf).unwrap().id, DeviceId(1));
    }

    #[test]
    fn missing_device_id_returns_none() {
        let backend = MockBackend::with_devices(1);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        assert!(registry.get(DeviceId(99)).is_none());
    }

    #[test]
    fn ats_like_device_name_marks_engines_aggregate() {
        let backend = MockBackend::with_named_devices(&["Intel(R) Data Center GPU Max (PVC)".to_string()]);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        assert!(registry.get(DeviceId(0)).unwrap().engines.iter().all(|e| e.is_aggregate));
    }

    #[test]
    fn generic_device_name_leaves_engines_per_engine() {
        let backend = MockBackend::with_devices(1);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        assert!(registry.get(DeviceId(0)).unwrap().engines.iter().all(|e| !e.is_aggregate));
    }
}
