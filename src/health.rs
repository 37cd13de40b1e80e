//! Health threshold evaluation over the latest snapshot.
//!
//! Five components are evaluated the same way the original CLI's health
//! comlet does: core temperature, memory temperature, power, memory (RAS
//! error counters), and fabric port (link state).

use serde::Serialize;

use crate::error::{GpumondError, Result};
use crate::model::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthComponent {
    CoreTemperature,
    MemoryTemperature,
    Power,
    Memory,
    FabricPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub device_id: DeviceId,
    pub component: HealthComponent,
    pub status: HealthStatus,
    pub description: String,
}

/// Evaluates a gauge-based component (core temp / memory temp / power)
/// against the device's own `throttle`/`shutdown` thresholds and an
/// optional caller-supplied `custom_threshold`.
///
/// `custom_threshold`, if present, must be `> 0` and `<= shutdown`; a
/// violation is a request error (`InvalidThreshold`), surfaced before any
/// comparison is made.
pub fn evaluate_component(
    current: i64,
    throttle: i64,
    shutdown: i64,
    custom_threshold: Option<i64>,
) -> Result<(HealthStatus, String)> {
    if let Some(custom) = custom_threshold {
        if custom <= 0 || custom > shutdown {
            return Err(GpumondError::InvalidThreshold(format!(
                "custom threshold {custom} must be > 0 and <= shutdown threshold {shutdown}"
            )));
        }
    }

    if current >= shutdown {
        return Ok((
            HealthStatus::Critical,
            format!("current value {current} has reached the shutdown threshold {shutdown}"),
        ));
    }

    let warning_threshold = throttle.max(custom_threshold.unwrap_or(i64::MIN));
    if current >= warning_threshold {
        return Ok((
            HealthStatus::Warning,
            format!("current value {current} has reached the throttle threshold {warning_threshold}"),
        ));
    }

    Ok((HealthStatus::Ok, format!("current value {current} is within normal range")))
}

/// Memory health is derived from RAS error counters rather than a gauge:
/// any uncorrectable error is `Critical`; correctable errors alone are
/// `Warning`.
pub fn evaluate_memory(uncorrectable_errors: i64, correctable_errors: i64) -> (HealthStatus, String) {
    if uncorrectable_errors > 0 {
        (
            HealthStatus::Critical,
            format!("{uncorrectable_errors} uncorrectable memory error(s) observed"),
        )
    } else if correctable_errors > 0 {
        (
            HealthStatus::Warning,
            format!("{correctable_errors} correctable memory error(s) observed"),
        )
    } else {
        (HealthStatus::Ok, "no memory errors observed".to_string())
    }
}

/// Fabric-port health derives from link state: a down link is `Critical`;
/// a link with replay errors but still up is `Warning`.
pub fn evaluate_fabric_port(link_up: bool, replay_errors: i64) -> (HealthStatus, String) {
    if !link_up {
        (HealthStatus::Critical, "fabric port link is down".to_string())
    } else if replay_errors > 0 {
        (
            HealthStatus::Warning,
            format!("fabric port link is up with {replay_errors} replay error(s)"),
        )
    } else {
        (HealthStatus::Ok, "fabric port link is up".to_string())
    }
}

/// Applies `evaluate` to every device ID in a group; a single device's
/// error does not prevent the others in the group from being evaluated.
pub fn evaluate_group<F>(device_ids: &[DeviceId], component: HealthComponent, evaluate: F) -> Vec<HealthReport>
where
    F: Fn(DeviceId) -> Result<(HealthStatus, String)>,
{
    device_ids
        .iter()
        .map(|&device_id| match evaluate(device_id) {
            Ok((status, description)) => HealthReport {
                device_id,
                component,
                status,
                description,
            },
            Err(e) => HealthReport {
                device_id,
                component,
                status: HealthStatus::Unknown,
                description: e.to_string(),
            },
        })
        .collect()
}
