//! Durable per-identifier progress.
//!
//! The in-memory `ProgressRecord` is the source of truth during a run; every
//! change is followed by a whole-file JSON snapshot (temp file + rename), so a
//! crash loses at most the outcome being written and never corrupts earlier ones.

mod record;
mod store;

pub use record::{Identifier, Outcome, ProgressRecord};
pub use store::{ProgressStore, Recorded};
