//! String-based argument parsing for the config command surface.
//!
//! Parsing is comma-delimited and case-insensitive for keywords, grounded
//! line-for-line on `comlet_config.cpp`'s `split`/`stoi`/`tolower`
//! sequence. Where the original catches an integer-parse exception to
//! signal a bad argument, this parses fallibly with `str::parse` and
//! matches on the result instead.

use crate::model::is_bdf;

/// Either a device ID or its PCI BDF address; accepted anywhere a device
/// ID is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Id(u32),
    Bdf(String),
}

pub fn parse_device_ref(s: &str) -> Result<DeviceRef, String> {
    let s = s.trim();
    if let Ok(id) = s.parse::<u32>() {
        return Ok(DeviceRef::Id(id));
    }
    if is_bdf(s) {
        return Ok(DeviceRef::Bdf(s.to_string()));
    }
    Err("device id should be a non-negative integer or a BDF string".to_string())
}

fn split(s: &str) -> Vec<&str> {
    s.split(',').map(str::trim).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandbyMode {
    Default,
    Never,
}

pub fn parse_standby(s: &str) -> Result<StandbyMode, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "default" => Ok(StandbyMode::Default),
        "never" => Ok(StandbyMode::Never),
        _ => Err("invalid parameter: standby mode".to_string()),
    }
}

/// Canonical textual form of a [`StandbyMode`], the mirror of
/// [`parse_standby`] that backends echo back through `query_config`.
pub fn format_standby(mode: StandbyMode) -> &'static str {
    match mode {
        StandbyMode::Default => "default",
        StandbyMode::Never => "never",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerSpec {
    Timeout { timeout_us: i64 },
    Timeslice { interval_us: i64, yield_timeout_us: i64 },
    Exclusive,
}

const SCHEDULER_US_MIN: i64 = 5_000;
const SCHEDULER_US_MAX: i64 = 100_000_000;

fn parse_scheduler_us(s: &str, field: &str) -> Result<i64, String> {
    let v: i64 = s
        .parse()
        .map_err(|_| format!("invalid parameter: {field}"))?;
    if !(SCHEDULER_US_MIN..=SCHEDULER_US_MAX).contains(&v) {
        return Err(format!(
            "invalid parameter: {field} should be between {SCHEDULER_US_MIN} and {SCHEDULER_US_MAX}."
        ));
    }
    Ok(v)
}

pub fn parse_scheduler_spec(s: &str) -> Result<SchedulerSpec, String> {
    let parts = split(s);
    let command = parts[0].to_ascii_lowercase();
    match command.as_str() {
        "timeout" => {
            if parts.len() != 2 || parts[1].is_empty() {
                return Err("invalid parameter: timeout".to_string());
            }
            let timeout_us = parse_scheduler_us(parts[1], "timeout")?;
            Ok(SchedulerSpec::Timeout { timeout_us })
        }
        "timeslice" => {
            if parts.len() != 3 || parts[1].is_empty() || parts[2].is_empty() {
                return Err("invalid parameter: timeslice".to_string());
            }
            let interval_us = parse_scheduler_us(parts[1], "timeslice")?;
            let yield_timeout_us = parse_scheduler_us(parts[2], "timeslice")?;
            Ok(SchedulerSpec::Timeslice {
                interval_us,
                yield_timeout_us,
            })
        }
        "exclusive" => {
            if parts.len() != 1 {
                return Err("invalid parameter: exclusive".to_string());
            }
            Ok(SchedulerSpec::Exclusive)
        }
        _ => Err("invalid scheduler mode".to_string()),
    }
}

/// Canonical textual form, used by the round-trip law in the testable
/// properties: parsing then formatting yields this form back.
pub fn format_scheduler_spec(spec: SchedulerSpec) -> String {
    match spec {
        SchedulerSpec::Timeout { timeout_us } => format!("timeout,{timeout_us}"),
        SchedulerSpec::Timeslice {
            interval_us,
            yield_timeout_us,
        } => format!("timeslice,{interval_us},{yield_timeout_us}"),
        SchedulerSpec::Exclusive => "exclusive".to_string(),
    }
}

pub fn parse_power_limit(s: &str) -> Result<(i64, Option<i64>), String> {
    let parts = split(s);
    if parts.is_empty() || parts[0].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    let watts: i64 = parts[0]
        .parse()
        .map_err(|_| "invalid parameter: powerlimit".to_string())?;
    if parts.len() == 2 && parts[1].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    if watts <= 0 {
        return Err("invalid parameter: power limit should bigger than 0.".to_string());
    }
    let interval = if parts.len() == 2 {
        Some(
            parts[1]
                .parse()
                .map_err(|_| "invalid parameter: powerlimit".to_string())?,
        )
    } else {
        None
    };
    Ok((watts, interval))
}

pub fn parse_frequency_range(s: &str) -> Result<(i64, i64), String> {
    let parts = split(s);
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    let min: i64 = parts[0]
        .parse()
        .map_err(|_| "invalid parameter: frequency range".to_string())?;
    let max: i64 = parts[1]
        .parse()
        .map_err(|_| "invalid parameter: frequency range".to_string())?;
    if min <= 0 || max <= 0 {
        return Err("invalid parameter: min/max frequency should bigger than 0.".to_string());
    }
    if min > max {
        return Err("invalid parameter: min frequency should not be bigger than max frequency.".to_string());
    }
    Ok((min, max))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfEngine {
    Compute,
    Media,
}

pub fn parse_performance_factor(s: &str) -> Result<(PerfEngine, f64), String> {
    let parts = split(s);
    if parts.len() != 2 || parts[1].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    let engine = match parts[0].to_ascii_lowercase().as_str() {
        "compute" => PerfEngine::Compute,
        "media" => PerfEngine::Media,
        _ => return Err("invalid engine".to_string()),
    };
    let value: f64 = parts[1].parse().map_err(|_| "invalid factor".to_string())?;
    if !(0.0..=100.0).contains(&value) {
        return Err("invalid factor".to_string());
    }
    Ok((engine, value))
}

pub fn parse_fabric_port_enable(s: &str) -> Result<(u32, bool), String> {
    let parts = split(s);
    if parts.len() != 2 || parts[1].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    let port: u32 = parts[0]
        .parse()
        .map_err(|_| "invalid parameter: xeLink port".to_string())?;
    let enabled: i32 = parts[1]
        .parse()
        .map_err(|_| "invalid parameter: xeLink port".to_string())?;
    if enabled != 0 && enabled != 1 {
        return Err("invalid parameter enabled".to_string());
    }
    Ok((port, enabled == 1))
}

pub fn parse_fabric_port_beaconing(s: &str) -> Result<(u32, bool), String> {
    let parts = split(s);
    if parts.len() != 2 || parts[1].is_empty() {
        return Err("invalid parameter: please check help information".to_string());
    }
    let port: u32 = parts[0]
        .parse()
        .map_err(|_| "invalid parameter: xeLink beaconing".to_string())?;
    let beaconing: i32 = parts[1]
        .parse()
        .map_err(|_| "invalid parameter: xeLink beaconing".to_string())?;
    if beaconing != 0 && beaconing != 1 {
        return Err("invalid parameter value: beaconing".to_string());
    }
    Ok((port, beaconing == 1))
}

pub fn parse_memory_ecc(s: &str) -> Result<bool, String> {
    let value: i32 = s.trim().parse().map_err(|_| "invalid parameter value".to_string())?;
    match value {
        1 => Ok(true),
        0 => Ok(false),
        _ => Err("invalid parameter value".to_string()),
    }
}
