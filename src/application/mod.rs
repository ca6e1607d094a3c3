//! Application layer - request/reply orchestration and task supervision.
//!
//! Coordinates the ports on behalf of the HTTP surface and keeps the
//! process-wide loops running.

mod correlator;
mod supervisor;

pub use correlator::{CorrelationError, RequestCorrelator, DEFAULT_REPLY_TIMEOUT};
pub use supervisor::{RestartPolicy, TaskSupervisor};
