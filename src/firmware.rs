//! Minimal firmware-version peripheral module.
//!
//! Out of the pipeline/control-plane core; enough to exercise
//! `FirmwareVersionMismatch` and exit code 47. Actual flashing I/O is not
//! implemented — that stays with the external hardware-sysman collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{GpumondError, Result};
use crate::model::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersions {
    pub gfx: String,
    pub gfx_data: String,
    pub amc: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingFlash {
    None,
    InProgress,
    Completed,
}

/// Tracks the last-known firmware versions per device and whether a
/// flash request is outstanding. Populated by the hardware-sysman
/// collaborator; this module only holds and validates the state.
pub struct FirmwareManager {
    versions: Mutex<HashMap<DeviceId, FirmwareVersions>>,
    pending: Mutex<HashMap<DeviceId, PendingFlash>>,
}

impl FirmwareManager {
    pub fn new() -> Self {
        Self {
            versions: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_versions(&self, device_id: DeviceId, versions: FirmwareVersions) {
        self.versions.lock().unwrap().insert(device_id, versions);
        self.pending.lock().unwrap().insert(device_id, PendingFlash::None);
    }

    pub fn query_versions(&self, device_id: DeviceId) -> Result<FirmwareVersions> {
        self.versions
            .lock()
            .unwrap()
            .get(&device_id)
            .cloned()
            .ok_or_else(|| GpumondError::DeviceNotFound(device_id.to_string()))
    }

    pub fn pending_flash(&self, device_id: DeviceId) -> PendingFlash {
        self.pending
            .lock()
            .unwrap()
            .get(&device_id)
            .copied()
            .unwrap_or(PendingFlash::None)
    }

    /// Checks a requested flash image's version string against the
    /// device's current one, refusing a downgrade.
    pub fn check_compatible(&self, device_id: DeviceId, requested_gfx_version: &str) -> Result<()> {
        let current = self.query_versions(device_id)?;
        if requested_gfx_version < current.gfx.as_str() {
            return Err(GpumondError::FirmwareVersionMismatch(format!(
                "requested version {requested_gfx_version} is older than installed {}",
                current.gfx
            )));
        }
        Ok(())
    }
}

impl Default for FirmwareManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn versions(gfx: &str) -> FirmwareVersions {
        FirmwareVersions {
            gfx: gfx.to_string(),
            gfx_data: "1.0".to_string(),
            amc: None,
        }
    }

    #[test]
    fn unknown_device_is_device_not_found() {
        let manager = FirmwareManager::new();
        assert!(manager.query_versions(DeviceId(0)).is_err());
    }

    #[test]
    fn downgrade_is_rejected() {
        let manager = FirmwareManager::new();
        manager.record_versions(DeviceId(0), versions("2.0"));
        let err = manager.check_compatible(DeviceId(0), "1.0").unwrap_err();
        assert_eq!(err.kind(), "firmware_version_mismatch");
    }

    #[test]
    fn same_or_newer_version_is_compatible() {
        let manager = FirmwareManager::new();
        manager.record_versions(DeviceId(0), versions("2.0"));
        assert!(manager.check_compatible(DeviceId(0), "2.0").is_ok());
        assert!(manager.check_compatible(DeviceId(0), "3.0").is_ok());
    }
}
