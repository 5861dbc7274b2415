//! Locale-aware message formatting.
//!
//! A message id is resolved through the environment's [`MessageSource`]
//! along the locale fallback chain (exact, language-only, default), then the
//! ICU-style template is rendered with already-evaluated arguments.

mod cache;
mod catalog;
mod template;

pub use cache::FormatterCache;
pub use catalog::{MessageCatalog, MessageSource, language_of, locale_chain, resolve_message};
pub use template::{MessageTemplate, Part, PluralKey, parse_template};

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::warn;

use crate::context::RemapEnv;
use crate::error::RemapError;

/// What a localization miss renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMessage {
    /// An empty string.
    Empty,
    /// The message id itself.
    #[default]
    Key,
    /// The id wrapped in a visible marker: `{{id}}`.
    Marker,
}

impl MissingMessage {
    pub fn render(&self, id: &str) -> String {
        match self {
            MissingMessage::Empty => String::new(),
            MissingMessage::Key => id.to_string(),
            MissingMessage::Marker => format!("{{{{{}}}}}", id),
        }
    }
}

/// Format message `id` for the environment's locale.
///
/// Returns `Ok(None)` when no locale in the fallback chain defines `id`;
/// callers choose how to surface that (see [`MissingMessage`]). A template
/// that fails to parse is a definition error.
pub fn format_message(
    env: &RemapEnv,
    id: &str,
    args: &JsonMap<String, JsonValue>,
) -> Result<Option<String>, RemapError> {
    let Some((locale, source)) =
        resolve_message(env.messages(), env.locale(), env.default_locale(), id)
    else {
        return Ok(None);
    };
    format_template(env, &locale, &source, args).map(Some)
}

/// Format message `id`, applying the configured miss behaviour.
pub fn format_message_or_missing(
    env: &RemapEnv,
    id: &str,
    args: &JsonMap<String, JsonValue>,
) -> Result<String, RemapError> {
    match format_message(env, id, args)? {
        Some(text) => Ok(text),
        None => {
            warn!(id, locale = env.locale(), "message not found in any fallback locale");
            Ok(env.options().missing_message.render(id))
        }
    }
}

/// Render an inline template source in `locale`.
pub fn format_template(
    env: &RemapEnv,
    locale: &str,
    source: &str,
    args: &JsonMap<String, JsonValue>,
) -> Result<String, RemapError> {
    let template = env.formatters().template(source)?;
    let mut out = String::with_capacity(source.len());
    render_parts(&template.parts, args, None, locale, env, &mut out);
    Ok(out)
}

fn render_parts(
    parts: &[Part],
    args: &JsonMap<String, JsonValue>,
    pound: Option<f64>,
    locale: &str,
    env: &RemapEnv,
    out: &mut String,
) {
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Pound => match pound {
                Some(n) => out.push_str(&format_number(n)),
                None => out.push('#'),
            },
            Part::Argument(name) => out.push_str(&argument_text(args.get(name))),
            Part::Number(name) => match args.get(name).and_then(numeric_value) {
                Some(n) => out.push_str(&format_number(n)),
                None => out.push_str(&argument_text(args.get(name))),
            },
            Part::Plural {
                argument,
                ordinal,
                offset,
                branches,
            } => {
                let value = args.get(argument).and_then(numeric_value);
                let Some(n) = value else {
                    if let Some(branch) = plural_branch(branches, |key| {
                        matches!(key, PluralKey::Category(c) if c == "other")
                    }) {
                        render_parts(&branch.parts, args, pound, locale, env, out);
                    }
                    continue;
                };
                let exact = plural_branch(branches, |key| {
                    matches!(key, PluralKey::Exact(exact) if *exact as f64 == n)
                });
                let shifted = n - *offset as f64;
                let branch = exact.or_else(|| {
                    let category = env.formatters().plural_category(locale, *ordinal, shifted);
                    plural_branch(branches, |key| {
                        matches!(key, PluralKey::Category(c) if c == category)
                    })
                    .or_else(|| {
                        plural_branch(branches, |key| {
                            matches!(key, PluralKey::Category(c) if c == "other")
                        })
                    })
                });
                if let Some(branch) = branch {
                    render_parts(&branch.parts, args, Some(shifted), locale, env, out);
                }
            }
            Part::Select { argument, branches } => {
                let key = args.get(argument).map(select_key);
                let branch = branches
                    .iter()
                    .find(|(k, _)| Some(k) == key.as_ref())
                    .or_else(|| branches.iter().find(|(k, _)| k == "other"));
                if let Some((_, branch)) = branch {
                    render_parts(&branch.parts, args, pound, locale, env, out);
                }
            }
        }
    }
}

fn plural_branch(
    branches: &[(PluralKey, MessageTemplate)],
    matches: impl Fn(&PluralKey) -> bool,
) -> Option<&MessageTemplate> {
    branches
        .iter()
        .find(|(key, _)| matches(key))
        .map(|(_, branch)| branch)
}

fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn select_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => argument_text(Some(other)),
    }
}

/// Text form of an interpolated argument; absent arguments render empty.
pub(crate) fn argument_text(value: Option<&JsonValue>) -> String {
    match value {
        None => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Null) => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
