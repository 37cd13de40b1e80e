//! Crate-wide error type.
//!
//! Mirrors the error-kind taxonomy of the telemetry/control-plane design:
//! sampling and persistence failures are always recovered from by the
//! caller (logged and suppressed), never propagated as panics. Only the
//! config command surface and the health evaluator surface these to an
//! external caller, and only as the payload of a structured result, never
//! as a raised exception at the crate boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpumondError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpumondError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("tile not found: {0}")]
    TileNotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("hardware failure: {0}")]
    HardwareFailure(String),

    #[error("transient sample miss: {0}")]
    TransientSampleMiss(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("firmware version mismatch: {0}")]
    FirmwareVersionMismatch(String),
}

impl GpumondError {
    /// Short, stable tag for this error's kind, used by `ExitCode::from`
    /// and in structured logging fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GpumondError::BadArgument(_) => "bad_argument",
            GpumondError::DeviceNotFound(_) => "device_not_found",
            GpumondError::TileNotFound(_) => "tile_not_found",
            GpumondError::Unsupported(_) => "unsupported",
            GpumondError::HardwareFailure(_) => "hardware_failure",
            GpumondError::TransientSampleMiss(_) => "transient_sample_miss",
            GpumondError::PersistenceFailure(_) => "persistence_failure",
            GpumondError::InvalidThreshold(_) => "invalid_threshold",
            GpumondError::FirmwareVersionMismatch(_) => "firmware_version_mismatch",
        }
    }
}
