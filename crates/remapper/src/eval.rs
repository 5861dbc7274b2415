//! Remapper evaluation.
//!
//! Every operation is a pure function of `(input, argument, context)`.
//! Definition errors were rejected by the parser; what remains are data
//! errors, which evaluate to [`EvalValue::Missing`] and never abort the
//! pipeline. The only runtime `RemapError`s come from message templates.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::{debug, error, info, trace, warn};

use crate::context::{ArrayScope, EvalValue, RemapContext, RemapEnv};
use crate::datetime::{add_duration, format_date, parse_date};
use crate::error::RemapError;
use crate::message::{format_message, format_message_or_missing, format_template};
use crate::model::{
    AppField, ArrayField, FormatOperation, IfOperation, LogLevel, Operation, Remapper,
    RemapperProps, Replacement, StringCase, TranslateOperation, UserField,
};
use crate::path::get_path;

/// Evaluate `remapper` against `input`.
pub fn evaluate(
    remapper: &Remapper,
    input: EvalValue,
    ctx: &RemapContext,
) -> Result<EvalValue, RemapError> {
    match remapper {
        Remapper::Literal(value) => Ok(EvalValue::Value(value.clone())),
        Remapper::Operation(op) => eval_operation(op, input, ctx),
        Remapper::Pipeline(steps) => {
            let mut acc = input;
            let mut step_ctx = ctx.clone();
            for step in steps {
                step_ctx = step_ctx.with_history(acc.clone());
                acc = evaluate(step, acc, &step_ctx)?;
            }
            Ok(acc)
        }
    }
}

/// Evaluate against a JSON input; `None` means the result is missing.
pub fn remap(
    remapper: &Remapper,
    input: &JsonValue,
    ctx: &RemapContext,
) -> Result<Option<JsonValue>, RemapError> {
    Ok(evaluate(remapper, EvalValue::Value(input.clone()), ctx)?.into_value())
}

fn eval_operation(
    op: &Operation,
    input: EvalValue,
    ctx: &RemapContext,
) -> Result<EvalValue, RemapError> {
    let env = ctx.env();
    let result = match op {
        Operation::Static(value) => EvalValue::Value(value.clone()),
        Operation::Root => EvalValue::Value(ctx.root().clone()),
        Operation::Context(path) => get_path(env.data(), path).cloned().into(),
        Operation::History(index) => ctx.history_entry(*index).cloned().unwrap_or_default(),
        Operation::Prop(path) => match input.as_value() {
            Some(value) => get_path(value, path).cloned().into(),
            None => EvalValue::Missing,
        },
        Operation::Array(field) => match ctx.array_scope() {
            Some(scope) => EvalValue::Value(match field {
                ArrayField::Index => JsonValue::from(scope.index),
                ArrayField::Length => JsonValue::from(scope.length),
                ArrayField::Item => JsonValue::clone(&scope.item),
            }),
            None => data_error(op, "used outside of an array operation"),
        },
        Operation::App(field) => eval_app(env, *field),
        Operation::User(field) => eval_user(env, *field),

        Operation::ArrayFrom(items) => {
            let values = items
                .iter()
                .map(|item| Ok(evaluate(item, input.clone(), ctx)?.into_json_or_null()))
                .collect::<Result<Vec<_>, RemapError>>()?;
            EvalValue::Value(JsonValue::Array(values))
        }
        Operation::ArrayAppend(items) => match input.as_value() {
            Some(JsonValue::Array(existing)) => {
                let mut values = existing.clone();
                for item in items {
                    values.push(evaluate(item, input.clone(), ctx)?.into_json_or_null());
                }
                EvalValue::Value(JsonValue::Array(values))
            }
            _ => data_error(op, "input is not an array"),
        },
        Operation::ObjectFrom(props) => {
            EvalValue::Value(JsonValue::Object(eval_props(props, &input, ctx)?))
        }
        Operation::ObjectAssign(props) => {
            let mut object = match input.as_value() {
                Some(JsonValue::Object(map)) => map.clone(),
                _ => JsonMap::new(),
            };
            object.extend(eval_props(props, &input, ctx)?);
            EvalValue::Value(JsonValue::Object(object))
        }
        Operation::ObjectOmit(keys) => match input.as_value() {
            Some(JsonValue::Object(map)) => EvalValue::Value(JsonValue::Object(
                map.iter()
                    .filter(|(key, _)| !keys.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            )),
            _ => data_error(op, "input is not an object"),
        },
        Operation::ArrayMap(mapper) => match input.as_value() {
            Some(JsonValue::Array(items)) => {
                let scoped = ctx.with_history(input.clone());
                let mut values = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let result = eval_element(mapper, item, index, items.len(), &scoped)?;
                    values.push(result.into_json_or_null());
                }
                EvalValue::Value(JsonValue::Array(values))
            }
            _ => data_error(op, "input is not an array"),
        },
        Operation::ArrayFilter(predicate) => match input.as_value() {
            Some(JsonValue::Array(items)) => {
                let scoped = ctx.with_history(input.clone());
                let mut kept = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    if eval_element(predicate, item, index, items.len(), &scoped)?.is_truthy() {
                        kept.push(item.clone());
                    }
                }
                EvalValue::Value(JsonValue::Array(kept))
            }
            _ => data_error(op, "input is not an array"),
        },
        Operation::ArrayFind(predicate) => match input.as_value() {
            Some(JsonValue::Array(items)) => {
                let scoped = ctx.with_history(input.clone());
                let mut found = EvalValue::Missing;
                for (index, item) in items.iter().enumerate() {
                    if eval_element(predicate, item, index, items.len(), &scoped)?.is_truthy() {
                        found = EvalValue::Value(item.clone());
                        break;
                    }
                }
                found
            }
            _ => data_error(op, "input is not an array"),
        },
        Operation::ArrayUnique(key) => match input.as_value() {
            Some(JsonValue::Array(items)) => {
                let scoped = ctx.with_history(input.clone());
                let mut seen = HashSet::new();
                let mut unique = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let identity = match key {
                        Some(key) => eval_element(key, item, index, items.len(), &scoped)?,
                        None => EvalValue::Value(item.clone()),
                    };
                    if seen.insert(canonical_key(&identity)) {
                        unique.push(item.clone());
                    }
                }
                EvalValue::Value(JsonValue::Array(unique))
            }
            _ => data_error(op, "input is not an array"),
        },
        Operation::NullStrip => match input {
            EvalValue::Value(value) => EvalValue::Value(strip_nulls(value)),
            EvalValue::Missing => EvalValue::Missing,
        },

        Operation::And(operands) => {
            let mut all = true;
            for operand in operands {
                if !evaluate(operand, input.clone(), ctx)?.is_truthy() {
                    all = false;
                    break;
                }
            }
            EvalValue::Value(JsonValue::Bool(all))
        }
        Operation::Or(operands) => {
            let mut any = false;
            for operand in operands {
                if evaluate(operand, input.clone(), ctx)?.is_truthy() {
                    any = true;
                    break;
                }
            }
            EvalValue::Value(JsonValue::Bool(any))
        }
        Operation::Not(operands) => {
            let values = eval_all(operands, &input, ctx)?;
            let result = match values.as_slice() {
                [] => true,
                [single] => !single.is_truthy(),
                many => !all_equal(many),
            };
            EvalValue::Value(JsonValue::Bool(result))
        }
        Operation::Equals(operands) => {
            let values = eval_all(operands, &input, ctx)?;
            EvalValue::Value(JsonValue::Bool(all_equal(&values)))
        }
        Operation::Gt(left, right) | Operation::Lt(left, right) => {
            let left = evaluate(left, input.clone(), ctx)?;
            let right = evaluate(right, input.clone(), ctx)?;
            let wanted = if matches!(op, Operation::Gt(..)) {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            EvalValue::Value(JsonValue::Bool(compare(&left, &right) == Some(wanted)))
        }
        Operation::If(branches) => eval_if(branches, input, ctx)?,
        Operation::Type => EvalValue::Value(JsonValue::from(type_name(&input))),

        Operation::StringCase(case) => match input.as_value() {
            Some(JsonValue::String(s)) => EvalValue::Value(JsonValue::String(match case {
                StringCase::Upper => s.to_uppercase(),
                StringCase::Lower => s.to_lowercase(),
            })),
            _ => data_error(op, "input is not a string"),
        },
        Operation::StringFormat(format) => {
            EvalValue::Value(JsonValue::String(eval_format(format, &input, ctx)?))
        }
        Operation::StringReplace(replacements) => match input.as_value() {
            Some(JsonValue::String(s)) => {
                EvalValue::Value(JsonValue::String(replace_all(s, replacements)))
            }
            _ => data_error(op, "input is not a string"),
        },
        Operation::NumberParse(radix) => {
            match input.as_value().and_then(|value| parse_number(value, *radix)) {
                Some(number) => EvalValue::Value(number),
                None => data_error(op, "input is not a parsable number"),
            }
        }
        Operation::DateNow => EvalValue::Value(JsonValue::String(format_date(env.now(), None))),
        Operation::DateParse(format) => {
            match input.as_value().and_then(|v| parse_date(v, format.as_deref())) {
                Some(date) => EvalValue::Value(JsonValue::String(format_date(date, None))),
                None => data_error(op, "input is not a parsable date"),
            }
        }
        Operation::DateAdd(duration) => {
            let shifted = input
                .as_value()
                .and_then(|v| parse_date(v, None))
                .and_then(|date| add_duration(date, *duration));
            match shifted {
                Some(date) => EvalValue::Value(JsonValue::String(format_date(date, None))),
                None => data_error(op, "input is not a date or the result is out of range"),
            }
        }
        Operation::DateFormat(format) => match input.as_value().and_then(|v| parse_date(v, None)) {
            Some(date) => {
                EvalValue::Value(JsonValue::String(format_date(date, format.as_deref())))
            }
            None => data_error(op, "input is not a parsable date"),
        },

        Operation::Translate(translate) => {
            EvalValue::Value(JsonValue::String(eval_translate(translate, &input, ctx)?))
        }
        Operation::Log(level) => {
            log_input(*level, &input, ctx);
            input
        }
    };
    Ok(result)
}

fn data_error(op: &Operation, reason: &str) -> EvalValue {
    debug!(operation = op.tag(), reason, "data error, result is missing");
    EvalValue::Missing
}

fn eval_app(env: &RemapEnv, field: AppField) -> EvalValue {
    let app = env.app();
    match field {
        AppField::Id => app.id.clone().map(JsonValue::String).into(),
        AppField::Url => EvalValue::Value(JsonValue::String(app.url.clone())),
        AppField::Locale => EvalValue::Value(JsonValue::String(env.locale().to_string())),
    }
}

fn eval_user(env: &RemapEnv, field: UserField) -> EvalValue {
    let Some(user) = env.user() else {
        return EvalValue::Missing;
    };
    let value = match field {
        UserField::Sub => Some(user.sub.clone()),
        UserField::Name => user.name.clone(),
        UserField::Email => user.email.clone(),
    };
    value.map(JsonValue::String).into()
}

fn eval_element(
    remapper: &Remapper,
    item: &JsonValue,
    index: usize,
    length: usize,
    scoped: &RemapContext,
) -> Result<EvalValue, RemapError> {
    let item = Arc::new(item.clone());
    let input = EvalValue::Value(JsonValue::clone(&item));
    let element_ctx = scoped.with_array_scope(ArrayScope {
        index,
        length,
        item,
    });
    evaluate(remapper, input, &element_ctx)
}

/// Evaluate props in declaration order; missing results are left out.
fn eval_props(
    props: &RemapperProps,
    input: &EvalValue,
    ctx: &RemapContext,
) -> Result<JsonMap<String, JsonValue>, RemapError> {
    let mut object = JsonMap::new();
    for (key, remapper) in props {
        if let EvalValue::Value(value) = evaluate(remapper, input.clone(), ctx)? {
            object.insert(key.clone(), value);
        }
    }
    Ok(object)
}

fn eval_all(
    operands: &[Remapper],
    input: &EvalValue,
    ctx: &RemapContext,
) -> Result<Vec<EvalValue>, RemapError> {
    operands
        .iter()
        .map(|operand| evaluate(operand, input.clone(), ctx))
        .collect()
}

fn eval_if(
    branches: &IfOperation,
    input: EvalValue,
    ctx: &RemapContext,
) -> Result<EvalValue, RemapError> {
    let condition = evaluate(&branches.condition, input.clone(), ctx)?;
    if condition.is_truthy() {
        evaluate(&branches.then_branch, input, ctx)
    } else {
        match &branches.else_branch {
            Some(else_branch) => evaluate(else_branch, input, ctx),
            None => Ok(EvalValue::Missing),
        }
    }
}

fn eval_format(
    format: &FormatOperation,
    input: &EvalValue,
    ctx: &RemapContext,
) -> Result<String, RemapError> {
    let env = ctx.env();
    let args = eval_props(&format.values, input, ctx)?;
    if let Some(id) = &format.message_id {
        if let Some(text) = format_message(env, id, &args)? {
            return Ok(text);
        }
    }
    match (&format.template, &format.message_id) {
        (Some(template), _) => format_template(env, env.locale(), template, &args),
        (None, Some(id)) => format_message_or_missing(env, id, &args),
        (None, None) => Ok(String::new()),
    }
}

fn eval_translate(
    translate: &TranslateOperation,
    input: &EvalValue,
    ctx: &RemapContext,
) -> Result<String, RemapError> {
    let args = match &translate.values {
        Some(values) => eval_props(values, input, ctx)?,
        None => match input.as_value() {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => JsonMap::new(),
        },
    };
    format_message_or_missing(ctx.env(), &translate.id, &args)
}

fn log_input(level: LogLevel, input: &EvalValue, ctx: &RemapContext) {
    let value = match input.as_value() {
        Some(value) => value.to_string(),
        None => "<missing>".to_string(),
    };
    let history = ctx.history().len();
    let locale = ctx.env().locale();
    match level {
        LogLevel::Trace => trace!(input = %value, history, locale, "remap"),
        LogLevel::Debug => debug!(input = %value, history, locale, "remap"),
        LogLevel::Info => info!(input = %value, history, locale, "remap"),
        LogLevel::Warn => warn!(input = %value, history, locale, "remap"),
        LogLevel::Error => error!(input = %value, history, locale, "remap"),
    }
}

/// Deep equality; numbers compare by value so `1` equals `1.0`.
pub fn json_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

fn eval_equal(left: &EvalValue, right: &EvalValue) -> bool {
    match (left, right) {
        (EvalValue::Missing, EvalValue::Missing) => true,
        (EvalValue::Value(a), EvalValue::Value(b)) => json_equal(a, b),
        _ => false,
    }
}

/// Dedup key; values [`eval_equal`] treats as equal map to the same key.
fn canonical_key(value: &EvalValue) -> String {
    let mut key = String::new();
    match value {
        EvalValue::Missing => key.push('~'),
        EvalValue::Value(value) => write_canonical(value, &mut key),
    }
    key
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => out.push_str(&i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e18 => {
                out.push_str(&(f as i64).to_string())
            }
            (None, Some(f)) => out.push_str(&format!("{f:?}")),
            (None, None) => out.push_str(&n.to_string()),
        },
        JsonValue::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&format!("{key:?}:"));
                write_canonical(item, out);
            }
            out.push('}');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn all_equal(values: &[EvalValue]) -> bool {
    match values.split_first() {
        Some((first, rest)) => rest.iter().all(|value| eval_equal(first, value)),
        None => true,
    }
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric when both sides read as numbers, lexical for two strings.
fn compare(left: &EvalValue, right: &EvalValue) -> Option<Ordering> {
    let (left, right) = (left.as_value()?, right.as_value()?);
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn type_name(value: &EvalValue) -> &'static str {
    match value {
        EvalValue::Missing => "missing",
        EvalValue::Value(JsonValue::Null) => "null",
        EvalValue::Value(JsonValue::Bool(_)) => "boolean",
        EvalValue::Value(JsonValue::Number(_)) => "number",
        EvalValue::Value(JsonValue::String(_)) => "string",
        EvalValue::Value(JsonValue::Array(_)) => "array",
        EvalValue::Value(JsonValue::Object(_)) => "object",
    }
}

fn strip_nulls(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

fn replace_all(input: &str, replacements: &[Replacement]) -> String {
    replacements
        .iter()
        .fold(input.to_string(), |text, replacement| {
            replacement
                .pattern
                .replace_all(&text, replacement.replacement.as_str())
                .into_owned()
        })
}

fn parse_number(value: &JsonValue, radix: Option<u32>) -> Option<JsonValue> {
    match (value, radix) {
        (JsonValue::Number(n), None) => Some(JsonValue::Number(n.clone())),
        (JsonValue::Number(n), Some(_)) => n.as_i64().map(JsonValue::from),
        (JsonValue::String(s), None) => {
            let s = s.trim();
            if let Ok(int) = s.parse::<i64>() {
                return Some(JsonValue::from(int));
            }
            let float = s.parse::<f64>().ok()?;
            JsonNumber::from_f64(float).map(JsonValue::Number)
        }
        (JsonValue::String(s), Some(radix)) => {
            i64::from_str_radix(s.trim(), radix).ok().map(JsonValue::from)
        }
        _ => None,
    }
}
