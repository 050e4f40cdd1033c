pub mod config;
pub mod control;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
