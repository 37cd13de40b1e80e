//! Validated control operations over device state.
//!
//! Every operation follows the same shape: validate → dispatch → format
//! result. No operation ever raises; on invalid input the hardware
//! mutator is never called and a structured [`CommandResult`] with
//! `status: Error` is returned instead.

use serde::Serialize;
use serde_json::json;

use crate::control::parse::{
    self, DeviceRef, PerfEngine, SchedulerSpec, StandbyMode,
};
use crate::device::DeviceRegistry;
use crate::hw::DeviceBackend;
use crate::model::DeviceId;

/// Outcome status of a config command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "CANCEL")]
    Cancel,
    #[serde(rename = "ERROR")]
    Error,
}

/// The structured result every config command returns. Never rendered as
/// a table by this crate — that is the CLI/RPC layer's job.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    #[serde(rename = "return")]
    pub return_message: String,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl CommandResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Ok,
            return_message: message.into(),
            error: None,
            details: None,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            return_message: message.into(),
            error: None,
            details: Some(details),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: CommandStatus::Error,
            return_message: message.clone(),
            error: Some(message),
            details: None,
        }
    }

    fn cancel(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Cancel,
            return_message: message.into(),
            error: None,
            details: None,
        }
    }
}

/// Typed parameters passed to [`crate::hw::DeviceBackend::apply`] for one
/// mutating config command.
#[derive(Debug, Clone)]
pub enum ConfigParams {
    SetPowerLimit {
        watts: i64,
        interval: Option<i64>,
    },
    SetFrequencyRange {
        tile: u32,
        min: i64,
        max: i64,
    },
    SetStandby {
        tile: u32,
        mode: StandbyMode,
    },
    SetScheduler {
        tile: u32,
        spec: SchedulerSpec,
    },
    SetPerformanceFactor {
        tile: u32,
        engine: PerfEngine,
        value: f64,
    },
    SetFabricPort {
        tile: u32,
        port: u32,
        enabled: bool,
    },
    SetFabricBeaconing {
        tile: u32,
        port: u32,
        on: bool,
    },
    SetMemoryEcc {
        enabled: bool,
    },
}

fn resolve_device<'a>(
    registry: &'a DeviceRegistry,
    device: &str,
) -> Result<&'a crate::device::Device, CommandResult> {
    let device_ref = parse::parse_device_ref(device).map_err(CommandResult::error)?;
    let found = match device_ref {
        DeviceRef::Id(id) => registry.get(DeviceId(id)),
        DeviceRef::Bdf(bdf) => crate::model::BdfAddress::new(bdf)
            .as_ref()
            .and_then(|b| registry.get_by_bdf(b)),
    };
    found.ok_or_else(|| CommandResult::error("device not found"))
}

/// `query(device, tile?)`.
pub fn query(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: Option<u32>,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if let Some(tile_id) = tile {
        if tile_id >= device.properties.num_tiles() {
            return CommandResult::error("tile not found");
        }
    }
    match backend.query_config(device.handle, tile) {
        Ok(snapshot) => {
            let details = serde_json::to_value(snapshot).unwrap_or(json!({}));
            CommandResult::ok_with_details("OK", details)
        }
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_power_limit(device, watts)`. `watts_and_interval` is the raw
/// comma-delimited argument, e.g. `"150"` or `"150,1000"`.
pub fn set_power_limit(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    watts_and_interval: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let (watts, interval) = match parse::parse_power_limit(watts_and_interval) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetPowerLimit { watts, interval };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok_with_details(
            format!("Succeed to set the power limit on GPU {}.", device.id),
            json!({ "power_limit_watts": watts, "interval": interval.unwrap_or(0) }),
        ),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_frequency_range(device, tile, min, max)`.
pub fn set_frequency_range(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    min_max: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let (min, max) = match parse::parse_frequency_range(min_max) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetFrequencyRange {
        tile: tile as u32,
        min,
        max,
    };
    match backend.apply(device.handle, &params) {
        Ok(outcome) => CommandResult::ok_with_details(
            format!(
                "Succeed to change the core frequency range on GPU {} tile {}.",
                device.id, tile
            ),
            json!({ "min_frequency": min, "max_frequency": max, "device_rounded": outcome.echoed_value }),
        ),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_standby(device, tile, mode)`.
pub fn set_standby(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    mode: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let mode = match parse::parse_standby(mode) {
        Ok(m) => m,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetStandby {
        tile: tile as u32,
        mode,
    };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok(format!(
            "Succeed to change the standby mode on GPU {} tile {}.",
            device.id, tile
        )),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_scheduler(device, tile, spec)`.
pub fn set_scheduler(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    spec: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let spec = match parse::parse_scheduler_spec(spec) {
        Ok(s) => s,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetScheduler {
        tile: tile as u32,
        spec,
    };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok(format!(
            "Succeed to change the scheduler mode on GPU {} tile {}.",
            device.id, tile
        )),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_performance_factor(device, tile, engine, value)`.
pub fn set_performance_factor(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    engine_and_value: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let (engine, value) = match parse::parse_performance_factor(engine_and_value) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetPerformanceFactor {
        tile: tile as u32,
        engine,
        value,
    };
    let engine_name = match engine {
        PerfEngine::Compute => "compute",
        PerfEngine::Media => "media",
    };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok(format!(
            "Succeed to change the {engine_name} performance factor to {value} on GPU {} tile {}.",
            device.id, tile
        )),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_fabric_port(device, tile, port, enabled)`.
pub fn set_fabric_port(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    port_and_enabled: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let (port, enabled) = match parse::parse_fabric_port_enable(port_and_enabled) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetFabricPort {
        tile: tile as u32,
        port,
        enabled,
    };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok(format!(
            "Succeed to change Xe Link port {port} to {} .",
            if enabled { "up" } else { "down" }
        )),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_fabric_beaconing(device, tile, port, on)`.
pub fn set_fabric_beaconing(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    tile: i64,
    port_and_on: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if tile < 0 {
        return CommandResult::error("invalid parameter: please check help information");
    }
    let (port, on) = match parse::parse_fabric_port_beaconing(port_and_on) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetFabricBeaconing {
        tile: tile as u32,
        port,
        on,
    };
    match backend.apply(device.handle, &params) {
        Ok(_) => CommandResult::ok(format!(
            "Succeed to change Xe Link port {port} beaconing to {} .",
            if on { "on" } else { "off" }
        )),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `set_memory_ecc(device, 0|1)`. The device needs a reboot/reset for the
/// change to take effect; `current` is left unchanged and only `pending`
/// reflects the request.
pub fn set_memory_ecc(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    value: &str,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let enabled = match parse::parse_memory_ecc(value) {
        Ok(v) => v,
        Err(e) => return CommandResult::error(e),
    };
    let params = ConfigParams::SetMemoryEcc { enabled };
    match backend.apply(device.handle, &params) {
        Ok(outcome) => {
            let pending = outcome
                .echoed_value
                .unwrap_or_else(|| if enabled { "enabled" } else { "disabled" }.to_string());
            CommandResult::ok_with_details(
                format!(
                    "Successfully {} ECC memory on GPU {}. Please reset the GPU or reboot the OS for the change to take effect.",
                    if enabled { "enable" } else { "disable" },
                    device.id
                ),
                json!({ "pending": pending }),
            )
        }
        Err(e) => CommandResult::error(e.to_string()),
    }
}

/// `reset_device(device)`. The caller must list and confirm the active
/// processes before `confirmed` is set to `true`; the core never blocks
/// on stdin itself (that belongs to the CLI).
pub fn reset_device(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    device: &str,
    confirmed: bool,
) -> CommandResult {
    let device = match resolve_device(registry, device) {
        Ok(d) => d,
        Err(e) => return e,
    };
    if !confirmed {
        let processes = backend.process_list(device.handle).unwrap_or_default();
        let details = json!({
            "device_process_list": processes
                .into_iter()
                .map(|p| json!({ "process_id": p.process_id, "process_name": p.process_name }))
                .collect::<Vec<_>>(),
        });
        let mut result = CommandResult::cancel("Reset is cancelled");
        result.details = Some(details);
        return result;
    }
    match backend.reset(device.handle, true) {
        Ok(()) => CommandResult::ok(format!("Succeed to reset the GPU {}", device.id)),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::test_util::MockBackend;

    fn registry_of(n: u32) -> (MockBackend, DeviceRegistry) {
        let backend = MockBackend::with_devices(n);
        let registry = DeviceRegistry::discover(&backend).unwrap();
        (backend, registry)
    }

    #[test]
    fn scheduler_timeslice_end_to_end() {
        let (backend, registry) = registry_of(1);
        let result = set_scheduler(&registry, &backend, "0", 0, "timeslice,20000,5000");
        assert_eq!(result.status, CommandStatus::Ok);
        assert_eq!(
            result.return_message,
            "Succeed to change the scheduler mode on GPU 0 tile 0."
        );
    }

    #[test]
    fn scheduler_timeslice_missing_param_is_error_and_no_hardware_call() {
        let (backend, registry) = registry_of(1);
        let result = set_scheduler(&registry, &backend, "0", 0, "timeslice,20000");
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.return_message, "invalid parameter: timeslice");
        assert!(backend.apply_log().is_empty());
    }

    #[test]
    fn unknown_device_never_dispatches() {
        let (backend, registry) = registry_of(1);
        let result = set_power_limit(&registry, &backend, "99", "150");
        assert_eq!(result.status, CommandStatus::Error);
        assert!(backend.apply_log().is_empty());
    }

    #[test]
    fn memory_ecc_toggle_reports_pending_without_mutating_current() {
        let (backend, registry) = registry_of(1);
        let result = set_memory_ecc(&registry, &backend, "0", "1");
        assert_eq!(result.status, CommandStatus::Ok);
        let details = result.details.unwrap();
        assert_eq!(details["pending"], "enabled");
    }

    #[test]
    fn reset_without_confirmation_is_cancelled() {
        let (backend, registry) = registry_of(1);
        let result = reset_device(&registry, &backend, "0", false);
        assert_eq!(result.status, CommandStatus::Cancel);
        assert!(backend.apply_log().is_empty());
    }

    #[test]
    fn bdf_accepted_wherever_device_id_is_expected() {
        let (backend, registry) = registry_of(2);
        let bdf = registry.get(DeviceId(1)).unwrap().bdf.0.clone();
        let result = set_power_limit(&registry, &backend, &bdf, "100");
        assert_eq!(result.status, CommandStatus::Ok);
    }

    #[test]
    fn query_after_set_frequency_range_reflects_the_new_values() {
        let (backend, registry) = registry_of(1);
        let set_result = set_frequency_range(&registry, &backend, "0", 0, "800,1800");
        assert_eq!(set_result.status, CommandStatus::Ok);

        let query_result = query(&registry, &backend, "0", Some(0));
        assert_eq!(query_result.status, CommandStatus::Ok);
        let details = query_result.details.unwrap();
        assert_eq!(details["min_frequency"], 800);
        assert_eq!(details["max_frequency"], 1800);
    }

    #[test]
    fn query_on_an_untouched_tile_reports_no_frequency_range() {
        let (backend, registry) = registry_of(1);
        set_frequency_range(&registry, &backend, "0", 0, "800,1800");

        let query_result = query(&registry, &backend, "0", Some(1));
        let details = query_result.details.unwrap();
        assert!(details["min_frequency"].is_null());
    }
}
