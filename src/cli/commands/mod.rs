//! CLI command implementations.

mod extract;
mod history;
mod providers;

pub use extract::{cmd_extract, ExtractArgs};
pub use history::cmd_history;
pub use providers::cmd_providers;
