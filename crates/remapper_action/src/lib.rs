mod config;
mod error;
mod handler;
mod model;
mod runner;
mod trace;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::ActionConfig;
pub use error::ActionError;
pub use handler::ActionHandler;
pub use model::{ActionDefinition, BuiltinAction, parse_action_yaml};
pub use runner::ActionRunner;
pub use trace::{ActionOutcome, ActionState, TraceNode};
