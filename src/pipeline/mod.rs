//! Pipeline observability: health monitoring, integrity checking, and
//! signal-to-decision traceability. These components read the same stores
//! the ingest path writes and never mutate business data.

pub mod health;
pub mod integrity;
pub mod trace;

pub use health::{PipelineHealth, PipelineHealthMonitor};
pub use integrity::{IntegrityChecker, IntegrityReport};
pub use trace::{TraceChain, Tracer};
