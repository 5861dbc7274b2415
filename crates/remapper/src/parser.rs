//! Definition parser: JSON/YAML values into the typed [`Remapper`] tree.
//!
//! - scalars, empty objects and objects with two or more keys are literals
//! - arrays holding at least one operation are pipelines; any other array
//!   is a literal
//! - single-key objects are operations; the key must be a known tag
//!
//! Errors carry a breadcrumb path such as `$[1].object.from.x`.

use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::datetime::{is_valid_format, parse_duration};
use crate::error::{RemapError, RemapErrorKind};
use crate::message::parse_template;
use crate::model::{
    AppField, ArrayField, FormatOperation, IfOperation, LogLevel, Operation, Remapper,
    RemapperProps, Replacement, StringCase, TranslateOperation, UserField,
};
use crate::path::{PathToken, parse_path};

pub fn parse_remapper(value: &JsonValue) -> Result<Remapper, RemapError> {
    parse_at(value, "$")
}

impl TryFrom<JsonValue> for Remapper {
    type Error = RemapError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        parse_remapper(&value)
    }
}

fn parse_at(value: &JsonValue, path: &str) -> Result<Remapper, RemapError> {
    match value {
        JsonValue::Array(steps) => {
            let steps = steps
                .iter()
                .enumerate()
                .map(|(index, step)| parse_at(step, &format!("{path}[{index}]")))
                .collect::<Result<Vec<_>, _>>()?;
            if steps.iter().all(Remapper::is_literal) {
                Ok(Remapper::Literal(value.clone()))
            } else {
                Ok(Remapper::Pipeline(steps))
            }
        }
        JsonValue::Object(map) if map.len() == 1 => {
            let Some((tag, arg)) = map.iter().next() else {
                return Ok(Remapper::Literal(value.clone()));
            };
            let op_path = format!("{path}.{tag}");
            let operation = parse_operation(tag, arg, &op_path).map_err(|err| {
                if err.kind == RemapErrorKind::UnknownOperation {
                    err.or_path(path)
                } else {
                    err.or_path(&op_path)
                }
            })?;
            Ok(Remapper::op(operation))
        }
        _ => Ok(Remapper::Literal(value.clone())),
    }
}

fn parse_operation(tag: &str, arg: &JsonValue, path: &str) -> Result<Operation, RemapError> {
    let op = match tag {
        "static" => Operation::Static(arg.clone()),
        "root" => Operation::Root,
        "context" => Operation::Context(parse_string_path(tag, arg)?),
        "history" => Operation::History(parse_index(tag, arg)?),
        "prop" => Operation::Prop(parse_prop_path(arg)?),
        "array" => Operation::Array(match expect_str(tag, arg)? {
            "index" => ArrayField::Index,
            "length" => ArrayField::Length,
            "item" => ArrayField::Item,
            other => return Err(unexpected_value(tag, other, "index, length, item")),
        }),
        "app" => Operation::App(match expect_str(tag, arg)? {
            "id" => AppField::Id,
            "url" => AppField::Url,
            "locale" => AppField::Locale,
            other => return Err(unexpected_value(tag, other, "id, url, locale")),
        }),
        "user" => Operation::User(match expect_str(tag, arg)? {
            "sub" => UserField::Sub,
            "name" => UserField::Name,
            "email" => UserField::Email,
            other => return Err(unexpected_value(tag, other, "sub, name, email")),
        }),

        "array.from" => Operation::ArrayFrom(parse_list(tag, arg, path)?),
        "array.append" => Operation::ArrayAppend(parse_list(tag, arg, path)?),
        "object.from" => Operation::ObjectFrom(parse_props(tag, arg, path)?),
        "object.assign" => Operation::ObjectAssign(parse_props(tag, arg, path)?),
        "object.omit" => Operation::ObjectOmit(parse_keys(tag, arg)?),
        "array.map" => Operation::ArrayMap(parse_at(arg, path)?),
        "array.filter" => Operation::ArrayFilter(parse_at(arg, path)?),
        "array.find" => Operation::ArrayFind(parse_at(arg, path)?),
        "array.unique" => Operation::ArrayUnique(match arg {
            JsonValue::Null => None,
            other => Some(parse_at(other, path)?),
        }),
        "null.strip" => Operation::NullStrip,

        "and" => Operation::And(parse_list(tag, arg, path)?),
        "or" => Operation::Or(parse_list(tag, arg, path)?),
        "not" => Operation::Not(parse_list(tag, arg, path)?),
        "equals" => Operation::Equals(parse_list(tag, arg, path)?),
        "gt" | "lt" => {
            let mut operands = parse_list(tag, arg, path)?;
            if operands.len() != 2 {
                return Err(RemapError::invalid_args(
                    tag,
                    format!("expected exactly 2 operands, got {}", operands.len()),
                ));
            }
            let right = operands.pop();
            let left = operands.pop();
            let (Some(left), Some(right)) = (left, right) else {
                return Err(RemapError::invalid_args(tag, "expected exactly 2 operands"));
            };
            if tag == "gt" {
                Operation::Gt(left, right)
            } else {
                Operation::Lt(left, right)
            }
        }
        "if" => Operation::If(parse_if(arg, path)?),
        "type" => Operation::Type,

        "string.case" => Operation::StringCase(match expect_str(tag, arg)? {
            "upper" => StringCase::Upper,
            "lower" => StringCase::Lower,
            other => return Err(unexpected_value(tag, other, "upper, lower")),
        }),
        "string.format" => Operation::StringFormat(parse_format(arg, path)?),
        "string.replace" => Operation::StringReplace(parse_replacements(arg)?),
        "number.parse" => Operation::NumberParse(parse_radix(arg)?),
        "date.now" => Operation::DateNow,
        "date.parse" => Operation::DateParse(parse_date_format(tag, arg)?),
        "date.add" => {
            let source = expect_str(tag, arg)?;
            let duration = parse_duration(source).ok_or_else(|| {
                RemapError::invalid_args(tag, format!("invalid duration '{source}'"))
            })?;
            Operation::DateAdd(duration)
        }
        "date.format" => Operation::DateFormat(parse_date_format(tag, arg)?),

        "translate" => Operation::Translate(parse_translate(arg, path)?),
        "log" => Operation::Log(match arg {
            JsonValue::Null => LogLevel::Info,
            other => match expect_str(tag, other)? {
                "trace" => LogLevel::Trace,
                "debug" => LogLevel::Debug,
                "info" => LogLevel::Info,
                "warn" => LogLevel::Warn,
                "error" => LogLevel::Error,
                level => {
                    return Err(unexpected_value(tag, level, "trace, debug, info, warn, error"));
                }
            },
        }),

        other => match other.strip_prefix("history.") {
            Some(index) => Operation::History(
                index
                    .parse::<usize>()
                    .map_err(|_| RemapError::unknown_operation(other))?,
            ),
            None => return Err(RemapError::unknown_operation(other)),
        },
    };
    Ok(op)
}

fn expect_str<'a>(tag: &str, arg: &'a JsonValue) -> Result<&'a str, RemapError> {
    arg.as_str()
        .ok_or_else(|| RemapError::invalid_args(tag, format!("expected a string, got {arg}")))
}

fn expect_object<'a>(
    tag: &str,
    arg: &'a JsonValue,
) -> Result<&'a JsonMap<String, JsonValue>, RemapError> {
    arg.as_object()
        .ok_or_else(|| RemapError::invalid_args(tag, format!("expected an object, got {arg}")))
}

fn unexpected_value(tag: &str, value: &str, allowed: &str) -> RemapError {
    RemapError::invalid_args(tag, format!("unexpected value '{value}' (expected one of: {allowed})"))
}

fn parse_index(tag: &str, arg: &JsonValue) -> Result<usize, RemapError> {
    arg.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            RemapError::invalid_args(tag, format!("expected a non-negative integer, got {arg}"))
        })
}

fn parse_string_path(tag: &str, arg: &JsonValue) -> Result<Vec<PathToken>, RemapError> {
    let source = expect_str(tag, arg)?;
    parse_path(source).map_err(|err| {
        RemapError::new(RemapErrorKind::InvalidPath, format!("{tag}: {err}"))
    })
}

/// `prop` accepts a path string, a bare index or a list of segments.
fn parse_prop_path(arg: &JsonValue) -> Result<Vec<PathToken>, RemapError> {
    match arg {
        JsonValue::String(_) => parse_string_path("prop", arg),
        JsonValue::Number(_) => Ok(vec![PathToken::Index(parse_index("prop", arg)?)]),
        JsonValue::Array(segments) => segments
            .iter()
            .map(|segment| match segment {
                JsonValue::String(key) => Ok(PathToken::Key(key.clone())),
                JsonValue::Number(_) => parse_index("prop", segment).map(PathToken::Index),
                other => Err(RemapError::new(
                    RemapErrorKind::InvalidPath,
                    format!("prop: invalid path segment {other}"),
                )),
            })
            .collect(),
        other => Err(RemapError::invalid_args(
            "prop",
            format!("expected a path string, index or list, got {other}"),
        )),
    }
}

fn parse_list(tag: &str, arg: &JsonValue, path: &str) -> Result<Vec<Remapper>, RemapError> {
    let items = arg
        .as_array()
        .ok_or_else(|| RemapError::invalid_args(tag, format!("expected an array, got {arg}")))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_at(item, &format!("{path}[{index}]")))
        .collect()
}

fn parse_props(tag: &str, arg: &JsonValue, path: &str) -> Result<RemapperProps, RemapError> {
    expect_object(tag, arg)?
        .iter()
        .map(|(key, value)| Ok((key.clone(), parse_at(value, &format!("{path}.{key}"))?)))
        .collect()
}

fn parse_keys(tag: &str, arg: &JsonValue) -> Result<Vec<String>, RemapError> {
    match arg {
        JsonValue::String(key) => Ok(vec![key.clone()]),
        JsonValue::Array(keys) => keys
            .iter()
            .map(|key| {
                key.as_str().map(str::to_string).ok_or_else(|| {
                    RemapError::invalid_args(tag, format!("keys must be strings, got {key}"))
                })
            })
            .collect(),
        other => Err(RemapError::invalid_args(
            tag,
            format!("expected a key or list of keys, got {other}"),
        )),
    }
}

fn parse_if(arg: &JsonValue, path: &str) -> Result<IfOperation, RemapError> {
    let map = expect_object("if", arg)?;
    for key in map.keys() {
        if !matches!(key.as_str(), "condition" | "then" | "else") {
            return Err(RemapError::invalid_args("if", format!("unknown field '{key}'")));
        }
    }
    let condition = map
        .get("condition")
        .ok_or_else(|| RemapError::invalid_args("if", "missing 'condition'"))?;
    let then_branch = map
        .get("then")
        .ok_or_else(|| RemapError::invalid_args("if", "missing 'then'"))?;
    Ok(IfOperation {
        condition: parse_at(condition, &format!("{path}.condition"))?,
        then_branch: parse_at(then_branch, &format!("{path}.then"))?,
        else_branch: map
            .get("else")
            .map(|branch| parse_at(branch, &format!("{path}.else")))
            .transpose()?,
    })
}

fn parse_format(arg: &JsonValue, path: &str) -> Result<FormatOperation, RemapError> {
    let tag = "string.format";
    let map = expect_object(tag, arg)?;
    let message_id = optional_str(tag, map, "messageId")?;
    let template = optional_str(tag, map, "template")?;
    if message_id.is_none() && template.is_none() {
        return Err(RemapError::invalid_args(tag, "requires 'messageId' or 'template'"));
    }
    if let Some(template) = &template {
        parse_template(template)?;
    }
    let values = match map.get("values") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(values) => parse_props(tag, values, &format!("{path}.values"))?,
    };
    Ok(FormatOperation {
        message_id,
        template,
        values,
    })
}

fn optional_str(
    tag: &str,
    map: &JsonMap<String, JsonValue>,
    key: &str,
) -> Result<Option<String>, RemapError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(RemapError::invalid_args(
            tag,
            format!("'{key}' must be a string, got {other}"),
        )),
    }
}

fn parse_replacements(arg: &JsonValue) -> Result<Vec<Replacement>, RemapError> {
    let tag = "string.replace";
    expect_object(tag, arg)?
        .iter()
        .map(|(pattern, replacement)| {
            let compiled = Regex::new(pattern).map_err(|err| {
                RemapError::invalid_args(tag, format!("invalid pattern '{pattern}': {err}"))
            })?;
            Ok(Replacement {
                pattern: compiled,
                replacement: expect_str(tag, replacement)?.to_string(),
            })
        })
        .collect()
}

fn parse_radix(arg: &JsonValue) -> Result<Option<u32>, RemapError> {
    match arg {
        JsonValue::Null => Ok(None),
        other => match other.as_u64() {
            Some(radix @ 2..=36) => Ok(Some(radix as u32)),
            _ => Err(RemapError::invalid_args(
                "number.parse",
                format!("radix must be null or an integer in 2..=36, got {other}"),
            )),
        },
    }
}

fn parse_date_format(tag: &str, arg: &JsonValue) -> Result<Option<String>, RemapError> {
    match arg {
        JsonValue::Null => Ok(None),
        other => {
            let format = expect_str(tag, other)?;
            if !is_valid_format(format) {
                return Err(RemapError::invalid_args(
                    tag,
                    format!("invalid date format '{format}'"),
                ));
            }
            Ok(Some(format.to_string()))
        }
    }
}

fn parse_translate(arg: &JsonValue, path: &str) -> Result<TranslateOperation, RemapError> {
    let tag = "translate";
    match arg {
        JsonValue::String(id) => Ok(TranslateOperation {
            id: id.clone(),
            values: None,
        }),
        JsonValue::Object(map) => {
            let id = optional_str(tag, map, "id")?
                .ok_or_else(|| RemapError::invalid_args(tag, "missing 'id'"))?;
            let values = match map.get("values") {
                None | Some(JsonValue::Null) => None,
                Some(values) => Some(parse_props(tag, values, &format!("{path}.values"))?),
            };
            Ok(TranslateOperation { id, values })
        }
        other => Err(RemapError::invalid_args(
            tag,
            format!("expected a message id or {{id, values}}, got {other}"),
        )),
    }
}
