//! Fixed exit-code taxonomy for the command-line collaborator.
//!
//! Preserved verbatim for compatibility with existing tooling; do not
//! renumber variants.

use crate::error::GpumondError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GenericError = 1,
    BadArgument = 2,
    BufferTooSmall = 3,
    DeviceNotFound = 4,
    TileNotFound = 5,
    GroupNotFound = 6,
    NotInitialized = 18,
    UnknownAgentConfigKey = 21,
    MetricNotSupported = 33,
    MetricNotEnabled = 34,
    HealthInvalidType = 35,
    HealthInvalidConfigType = 36,
    HealthInvalidThreshold = 37,
    FirmwareVersionMismatch = 47,
    MemoryEccUnsupported = 48,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<&GpumondError> for ExitCode {
    fn from(err: &GpumondError) -> Self {
        match err {
            GpumondError::BadArgument(_) => ExitCode::BadArgument,
            GpumondError::DeviceNotFound(_) => ExitCode::DeviceNotFound,
            GpumondError::TileNotFound(_) => ExitCode::TileNotFound,
            GpumondError::Unsupported(_) => ExitCode::MetricNotSupported,
            GpumondError::HardwareFailure(_) => ExitCode::GenericError,
            GpumondError::TransientSampleMiss(_) => ExitCode::GenericError,
            GpumondError::PersistenceFailure(_) => ExitCode::GenericError,
            GpumondError::InvalidThreshold(_) => ExitCode::HealthInvalidThreshold,
            GpumondError::FirmwareVersionMismatch(_) => ExitCode::FirmwareVersionMismatch,
        }
    }
}
