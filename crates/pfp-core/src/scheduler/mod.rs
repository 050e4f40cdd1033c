//! Worker pool: N loops drain a shared queue, one identifier at a time, each
//! with its own retry budget, and record every final outcome.

mod events;
mod pool;
mod queue;

pub use events::{RunEvent, RunSummary};
pub use pool::{RunError, Scheduler};
pub use queue::WorkQueue;
