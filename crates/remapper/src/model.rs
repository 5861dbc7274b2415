//! Typed remapper definitions.
//!
//! Definitions arrive as JSON/YAML and are parsed once (see
//! [`crate::parser`]) into this closed tree, so evaluation never sees an
//! unknown operation tag.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::datetime::DateDuration;
use crate::path::PathToken;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "JsonValue")]
pub enum Remapper {
    /// Ignores its input and returns the literal.
    Literal(JsonValue),
    Operation(Box<Operation>),
    /// Steps evaluated left to right, each output feeding the next step.
    /// At least one step is an operation.
    Pipeline(Vec<Remapper>),
}

/// Named properties evaluated in declaration order.
pub type RemapperProps = Vec<(String, Remapper)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    // value access
    Static(JsonValue),
    Root,
    Context(Vec<PathToken>),
    History(usize),
    Prop(Vec<PathToken>),
    Array(ArrayField),
    App(AppField),
    User(UserField),

    // construction
    ArrayFrom(Vec<Remapper>),
    ArrayAppend(Vec<Remapper>),
    ObjectFrom(RemapperProps),
    ObjectAssign(RemapperProps),
    ObjectOmit(Vec<String>),
    ArrayMap(Remapper),
    ArrayFilter(Remapper),
    ArrayFind(Remapper),
    ArrayUnique(Option<Remapper>),
    NullStrip,

    // logic and comparison
    And(Vec<Remapper>),
    Or(Vec<Remapper>),
    Not(Vec<Remapper>),
    Equals(Vec<Remapper>),
    Gt(Remapper, Remapper),
    Lt(Remapper, Remapper),
    If(IfOperation),
    Type,

    // strings, numbers, dates
    StringCase(StringCase),
    StringFormat(FormatOperation),
    StringReplace(Vec<Replacement>),
    NumberParse(Option<u32>),
    DateNow,
    DateParse(Option<String>),
    DateAdd(DateDuration),
    DateFormat(Option<String>),

    // localization and diagnostics
    Translate(TranslateOperation),
    Log(LogLevel),
}

impl Operation {
    /// Tag this operation was written with.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Static(_) => "static",
            Operation::Root => "root",
            Operation::Context(_) => "context",
            Operation::History(_) => "history",
            Operation::Prop(_) => "prop",
            Operation::Array(_) => "array",
            Operation::App(_) => "app",
            Operation::User(_) => "user",
            Operation::ArrayFrom(_) => "array.from",
            Operation::ArrayAppend(_) => "array.append",
            Operation::ObjectFrom(_) => "object.from",
            Operation::ObjectAssign(_) => "object.assign",
            Operation::ObjectOmit(_) => "object.omit",
            Operation::ArrayMap(_) => "array.map",
            Operation::ArrayFilter(_) => "array.filter",
            Operation::ArrayFind(_) => "array.find",
            Operation::ArrayUnique(_) => "array.unique",
            Operation::NullStrip => "null.strip",
            Operation::And(_) => "and",
            Operation::Or(_) => "or",
            Operation::Not(_) => "not",
            Operation::Equals(_) => "equals",
            Operation::Gt(..) => "gt",
            Operation::Lt(..) => "lt",
            Operation::If(_) => "if",
            Operation::Type => "type",
            Operation::StringCase(_) => "string.case",
            Operation::StringFormat(_) => "string.format",
            Operation::StringReplace(_) => "string.replace",
            Operation::NumberParse(_) => "number.parse",
            Operation::DateNow => "date.now",
            Operation::DateParse(_) => "date.parse",
            Operation::DateAdd(_) => "date.add",
            Operation::DateFormat(_) => "date.format",
            Operation::Translate(_) => "translate",
            Operation::Log(_) => "log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayField {
    Index,
    Length,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppField {
    Id,
    Url,
    Locale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Sub,
    Name,
    Email,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfOperation {
    pub condition: Remapper,
    pub then_branch: Remapper,
    pub else_branch: Option<Remapper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCase {
    Upper,
    Lower,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatOperation {
    pub message_id: Option<String>,
    pub template: Option<String>,
    pub values: RemapperProps,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOperation {
    pub id: String,
    /// `None` formats with the fields of an object input.
    pub values: Option<RemapperProps>,
}

/// A compiled `pattern -> replacement` pair of `string.replace`.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub pattern: Regex,
    pub replacement: String,
}

impl PartialEq for Replacement {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str() && self.replacement == other.replacement
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Remapper {
    pub fn literal(value: JsonValue) -> Self {
        Remapper::Literal(value)
    }

    pub fn op(operation: Operation) -> Self {
        Remapper::Operation(Box::new(operation))
    }

    /// True when evaluation ignores the input entirely.
    pub fn is_literal(&self) -> bool {
        matches!(self, Remapper::Literal(_))
    }
}
