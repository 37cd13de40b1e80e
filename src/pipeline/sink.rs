//! The persistence sink boundary.
//!
//! `append` must never block the handler for long and must never
//! propagate a durability failure into the pipeline — callers log and
//! continue per the error-handling design.

use std::collections::BTreeMap;
use std::sync::mpsc::{Sender, SendError};

use crate::error::{GpumondError, Result};
use crate::model::{DeviceId, MeasurementDatum, MetricType};

pub trait PersistenceSink: Send + Sync {
    fn append(
        &self,
        metric_type: MetricType,
        timestamp_us: i64,
        data: &BTreeMap<DeviceId, MeasurementDatum>,
    ) -> Result<()>;
}

/// Discards every record. Used in tests and benchmarks where durability
/// is irrelevant.
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn append(
        &self,
        _metric_type: MetricType,
        _timestamp_us: i64,
        _data: &BTreeMap<DeviceId, MeasurementDatum>,
    ) -> Result<()> {
        Ok(())
    }
}

/// One record of what would be written to durable storage.
#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub metric_type: MetricType,
    pub timestamp_us: i64,
    pub data: BTreeMap<DeviceId, MeasurementDatum>,
}

/// Buffers records onto an `mpsc::Sender`, consumed by a background
/// writer thread. `append` itself never touches durable storage — it
/// only enqueues, so it cannot block the handler on I/O.
pub struct ChannelSink {
    sender: Sender<PersistedRecord>,
}

impl ChannelSink {
    pub fn new(sender: Sender<PersistedRecord>) -> Self {
        Self { sender }
    }
}

impl PersistenceSink for ChannelSink {
    fn append(
        &self,
        metric_type: MetricType,
        timestamp_us: i64,
        data: &BTreeMap<DeviceId, MeasurementDatum>,
    ) -> Result<()> {
        self.sender
            .send(PersistedRecord {
                metric_type,
                timestamp_us,
                data: data.clone(),
            })
            .map_err(|SendError(_)| {
                GpumondError::PersistenceFailure("sink consumer has disconnected".to_string())
            })
    }
}
