//! Domain types and ambient plumbing shared by every crate in the agentic run subsystem.

pub mod config;
pub mod logging;
pub mod types;

pub use config::{ConfigError, RuntimeConfig};
pub use logging::init_tracing;
pub use types::*;
