mod context;
mod datetime;
mod error;
mod eval;
mod model;
mod parser;
mod path;
pub mod message;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use context::{
    AppInfo, ArrayScope, EvalValue, History, RemapContext, RemapEnv, RemapOptions, UserInfo,
};
pub use datetime::{DateDuration, parse_duration};
pub use error::{RemapError, RemapErrorKind};
pub use eval::{evaluate, json_equal, remap};
pub use message::{
    FormatterCache, MessageCatalog, MessageSource, MissingMessage, format_message,
    format_message_or_missing,
};
pub use model::{
    AppField, ArrayField, FormatOperation, IfOperation, LogLevel, Operation, Remapper,
    RemapperProps, Replacement, StringCase, TranslateOperation, UserField,
};
pub use parser::parse_remapper;
pub use path::{PathError, PathToken, get_path, parse_path};

use serde_json::Value as JsonValue;

/// Parse a remapper definition written in YAML (or JSON).
pub fn parse_remapper_yaml(yaml: &str) -> Result<Remapper, RemapError> {
    let value: JsonValue = serde_yaml::from_str(yaml)?;
    parse_remapper(&value)
}
