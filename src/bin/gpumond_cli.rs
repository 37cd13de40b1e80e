//! Minimal CLI front-end over the `gpumond` library.
//!
//! Informative only, not part of the core per the scope note in the
//! design docs: prints `CommandResult`/`Snapshot` as JSON, no table
//! rendering. Runs against [`gpumond::hw::demo_backend::DemoBackend`]
//! since the real hardware-sysman binding is an external collaborator
//! this crate does not ship.

use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use gpumond::control::CommandStatus;
use gpumond::exit_code::ExitCode;
use gpumond::health::{self, HealthComponent};
use gpumond::hw::demo_backend::DemoBackend;
use gpumond::model::{DeviceId, MetricType};
use gpumond::pipeline::sink::NullSink;
use gpumond::settings::Settings;
use gpumond::Service;

#[derive(Parser)]
#[command(name = "gpumond-cli", version, about = "GPU fleet management and telemetry, informative CLI front-end")]
struct Cli {
    /// Path to a TOML settings file; defaults are used if omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Number of synthetic devices the demo backend enumerates.
    #[arg(long, default_value_t = 2)]
    devices: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered devices.
    Discovery,
    /// Query or mutate device configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Evaluate health thresholds for a device.
    Health {
        device: String,
    },
    /// Print the latest per-metric snapshot for a device.
    Stats {
        device: String,
    },
    /// Sample a device a fixed number of times, printing each snapshot.
    Dump {
        device: String,
        #[arg(long, default_value_t = 5)]
        ticks: u32,
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Query {
        device: String,
        #[arg(long)]
        tile: Option<u32>,
    },
    SetPowerLimit {
        device: String,
        value: String,
    },
    SetFrequencyRange {
        device: String,
        tile: i64,
        value: String,
    },
    SetStandby {
        device: String,
        tile: i64,
        mode: String,
    },
    SetScheduler {
        device: String,
        tile: i64,
        spec: String,
    },
    SetPerformanceFactor {
        device: String,
        tile: i64,
        value: String,
    },
    SetFabricPort {
        device: String,
        tile: i64,
        value: String,
    },
    SetFabricBeaconing {
        device: String,
        tile: i64,
        value: String,
    },
    SetMemoryEcc {
        device: String,
        value: String,
    },
    Reset {
        device: String,
        /// Skip the confirmation gate and dispatch the reset immediately.
        #[arg(long)]
        yes: bool,
    },
}

fn print_command_result(result: &gpumond::control::CommandResult) -> ProcessExitCode {
    println!("{}", serde_json::to_string_pretty(result).unwrap());
    match result.status {
        CommandStatus::Ok | CommandStatus::Cancel => ProcessExitCode::SUCCESS,
        CommandStatus::Error => ProcessExitCode::from(ExitCode::GenericError.as_i32() as u8),
    }
}

fn resolve_device_id(service: &Service, device: &str) -> Option<DeviceId> {
    device.parse::<u32>().ok().map(DeviceId).filter(|id| service.registry().get(*id).is_some())
}

fn main() -> ProcessExitCode {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => match Settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("failed to load settings: {e}");
                return ProcessExitCode::from(ExitCode::BadArgument.as_i32() as u8);
            }
        },
        None => Settings::default(),
    };

    gpumond::logging::init(&settings.log_filter);

    let backend = Arc::new(DemoBackend::new(cli.devices));
    let mut service = match Service::start(backend, &settings, Arc::new(NullSink)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to start service: {e}");
            return ProcessExitCode::from(ExitCode::GenericError.as_i32() as u8);
        }
    };

    let exit = match cli.command {
        Command::Discovery => {
            let devices: Vec<_> = service
                .registry()
                .iter()
                .map(|d| serde_json::json!({ "id": d.id, "bdf": d.bdf.0, "num_tiles": d.properties.num_tiles() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&devices).unwrap());
            ProcessExitCode::SUCCESS
        }
        Command::Config { action } => run_config(&service, action),
        Command::Health { device } => run_health(&service, &device),
        Command::Stats { device } => run_stats(&service, &device),
        Command::Dump { device, ticks, interval_ms } => run_dump(&service, &device, ticks, interval_ms),
    };

    service.shutdown();
    exit
}

fn run_config(service: &Service, action: ConfigAction) -> ProcessExitCode {
    let result = match action {
        ConfigAction::Query { device, tile } => service.query(&device, tile),
        ConfigAction::SetPowerLimit { device, value } => service.set_power_limit(&device, &value),
        ConfigAction::SetFrequencyRange { device, tile, value } => service.set_frequency_range(&device, tile, &value),
        ConfigAction::SetStandby { device, tile, mode } => service.set_standby(&device, tile, &mode),
        ConfigAction::SetScheduler { device, tile, spec } => service.set_scheduler(&device, tile, &spec),
        ConfigAction::SetPerformanceFactor { device, tile, value } => service.set_performance_factor(&device, tile, &value),
        ConfigAction::SetFabricPort { device, tile, value } => service.set_fabric_port(&device, tile, &value),
        ConfigAction::SetFabricBeaconing { device, tile, value } => service.set_fabric_beaconing(&device, tile, &value),
        ConfigAction::SetMemoryEcc { device, value } => service.set_memory_ecc(&device, &value),
        ConfigAction::Reset { device, yes } => service.reset_device(&device, yes),
    };
    print_command_result(&result)
}

fn run_stats(service: &Service, device: &str) -> ProcessExitCode {
    let Some(id) = resolve_device_id(service, device) else {
        eprintln!("device not found: {device}");
        return ProcessExitCode::from(ExitCode::DeviceNotFound.as_i32() as u8);
    };
    // Metric threads need one tick to publish before a snapshot has data.
    thread::sleep(Duration::from_millis(1_100));
    match service.snapshot(id) {
        Some(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot).unwrap());
            ProcessExitCode::SUCCESS
        }
        None => {
            eprintln!("device not found: {device}");
            ProcessExitCode::from(ExitCode::DeviceNotFound.as_i32() as u8)
        }
    }
}

fn run_dump(service: &Service, device: &str, ticks: u32, interval_ms: u64) -> ProcessExitCode {
    let Some(id) = resolve_device_id(service, device) else {
        eprintln!("device not found: {device}");
        return ProcessExitCode::from(ExitCode::DeviceNotFound.as_i32() as u8);
    };
    for _ in 0..ticks {
        thread::sleep(Duration::from_millis(interval_ms));
        if let Some(snapshot) = service.snapshot(id) {
            println!("{}", serde_json::to_string(&snapshot).unwrap());
        }
    }
    ProcessExitCode::SUCCESS
}

/// Evaluates the gauge-backed health components from the device's latest
/// snapshot. Memory (RAS counters) and fabric-port link state are not
/// produced by the demo backend, so those two report `Unknown` rather
/// than a fabricated reading.
fn run_health(service: &Service, device: &str) -> ProcessExitCode {
    let Some(id) = resolve_device_id(service, device) else {
        eprintln!("device not found: {device}");
        return ProcessExitCode::from(ExitCode::DeviceNotFound.as_i32() as u8);
    };
    thread::sleep(Duration::from_millis(1_100));
    let Some(snapshot) = service.snapshot(id) else {
        eprintln!("device not found: {device}");
        return ProcessExitCode::from(ExitCode::DeviceNotFound.as_i32() as u8);
    };

    let thresholds = &Settings::default().health_thresholds;
    let mut reports = Vec::new();

    if let Some(metric) = snapshot.per_metric.get(&MetricType::GpuTemperature) {
        let outcome = health::evaluate_component(
            metric.value,
            thresholds.core_temp_throttle_c,
            thresholds.core_temp_shutdown_c,
            None,
        );
        reports.push(match outcome {
            Ok((status, description)) => gpumond::health::HealthReport {
                device_id: id,
                component: HealthComponent::CoreTemperature,
                status,
                description,
            },
            Err(e) => gpumond::health::HealthReport {
                device_id: id,
                component: HealthComponent::CoreTemperature,
                status: gpumond::health::HealthStatus::Unknown,
                description: e.to_string(),
            },
        });
    }

    if let Some(metric) = snapshot.per_metric.get(&MetricType::Power) {
        let outcome = health::evaluate_component(
            metric.value,
            thresholds.power_throttle_w,
            thresholds.power_shutdown_w,
            None,
        );
        if let Ok((status, description)) = outcome {
            reports.push(gpumond::health::HealthReport {
                device_id: id,
                component: HealthComponent::Power,
                status,
                description,
            });
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports).unwrap());
    ProcessExitCode::SUCCESS
}
