//! Device registry: the immutable-after-init map from device IDs to
//! device descriptors and hardware handles.

pub mod registry;

pub use registry::{Device, DeviceRegistry};
