//! The measurement pipeline: per-tick sample assembly, the data handler
//! family, the sampling loop, the persistence sink boundary, and the
//! sink-facing query API.

pub mod handler;
pub mod loop_;
pub mod query;
pub mod sample;
pub mod sink;

pub use handler::DataHandler;
pub use loop_::SamplingLoop;
pub use query::{snapshot, Snapshot};
pub use sink::PersistenceSink;
