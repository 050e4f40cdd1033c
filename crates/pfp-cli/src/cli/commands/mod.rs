//! CLI command handlers, one per file.

mod login;
mod reset;
mod run;
mod status;

pub use login::run_login;
pub use reset::run_reset;
pub use run::run_pipeline;
pub use status::run_status;
