//! ICU-style message template parser using winnow.
//!
//! Supported syntax:
//! - `{name}` simple argument, `{name, number}` numeric argument
//! - `{name, plural, offset:1 =0{none} one{# item} other{# items}}`
//! - `{name, selectordinal, one{#st} two{#nd} few{#rd} other{#th}}`
//! - `{name, select, male{he} female{she} other{they}}`
//! - `#` inside a plural branch prints the (offset) number
//! - Quoting: `''` is a literal apostrophe; `'{`, `'}` (and `'#` inside a
//!   plural branch) open a quoted literal that runs to the next lone `'`
//!
//! Any other argument type (`{when, date, short}`) is accepted and rendered
//! as a simple argument.

use winnow::ascii::{dec_int, multispace0};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use crate::error::{RemapError, RemapErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Pound,
    Argument(String),
    Number(String),
    Plural {
        argument: String,
        ordinal: bool,
        offset: i64,
        branches: Vec<(PluralKey, MessageTemplate)>,
    },
    Select {
        argument: String,
        branches: Vec<(String, MessageTemplate)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PluralKey {
    Exact(i64),
    Category(String),
}

impl MessageTemplate {
    /// Argument names referenced anywhere in the template, in first-use order.
    pub fn arguments(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_arguments(&self.parts, &mut names);
        names
    }
}

fn collect_arguments<'a>(parts: &'a [Part], names: &mut Vec<&'a str>) {
    for part in parts {
        match part {
            Part::Text(_) | Part::Pound => {}
            Part::Argument(name) | Part::Number(name) => push_unique(names, name),
            Part::Plural {
                argument, branches, ..
            } => {
                push_unique(names, argument);
                for (_, branch) in branches {
                    collect_arguments(&branch.parts, names);
                }
            }
            Part::Select { argument, branches } => {
                push_unique(names, argument);
                for (_, branch) in branches {
                    collect_arguments(&branch.parts, names);
                }
            }
        }
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Parse a template string into its parts.
pub fn parse_template(source: &str) -> Result<MessageTemplate, RemapError> {
    let mut remaining = source;
    match message(&mut remaining, false) {
        Ok(parts) if remaining.is_empty() => Ok(MessageTemplate { parts }),
        Ok(_) => Err(template_error(source, remaining, "unmatched '}'")),
        Err(_) => Err(template_error(source, remaining, "invalid placeholder")),
    }
}

fn template_error(source: &str, remaining: &str, message: &str) -> RemapError {
    let offset = source.len() - remaining.len();
    RemapError::new(
        RemapErrorKind::InvalidTemplate,
        format!("{} at offset {} in message template {:?}", message, offset, source),
    )
}

fn cut() -> ErrMode<ContextError> {
    ErrMode::Cut(ContextError::new())
}

/// Parse parts until end of input or an unconsumed `}`.
fn message(input: &mut &str, in_plural: bool) -> ModalResult<Vec<Part>> {
    let mut parts = Vec::new();
    while let Some(c) = input.chars().next() {
        match c {
            '}' => break,
            '{' => parts.push(placeholder(input, in_plural)?),
            '#' if in_plural => {
                *input = &input[1..];
                parts.push(Part::Pound);
            }
            '\'' => {
                let text = apostrophe(input, in_plural);
                push_text(&mut parts, &text);
            }
            _ => {
                let text = plain_text(input, in_plural)?;
                push_text(&mut parts, text);
            }
        }
    }
    Ok(parts)
}

fn push_text(parts: &mut Vec<Part>, text: &str) {
    if let Some(Part::Text(prev)) = parts.last_mut() {
        prev.push_str(text);
    } else {
        parts.push(Part::Text(text.to_string()));
    }
}

fn plain_text<'i>(input: &mut &'i str, in_plural: bool) -> ModalResult<&'i str> {
    take_till(1.., move |c: char| {
        c == '{' || c == '}' || c == '\'' || (in_plural && c == '#')
    })
    .parse_next(input)
}

/// Handle an apostrophe at the start of `input`.
fn apostrophe(input: &mut &str, in_plural: bool) -> String {
    if let Some(rest) = input.strip_prefix("''") {
        *input = rest;
        return "'".to_string();
    }
    let rest = &input[1..];
    let opens_quote = rest.starts_with('{')
        || rest.starts_with('}')
        || (in_plural && rest.starts_with('#'));
    if !opens_quote {
        *input = rest;
        return "'".to_string();
    }

    let mut text = String::new();
    let mut cursor = rest;
    loop {
        match cursor.find('\'') {
            None => {
                text.push_str(cursor);
                cursor = "";
                break;
            }
            Some(pos) => {
                text.push_str(&cursor[..pos]);
                let after = &cursor[pos + 1..];
                if let Some(doubled) = after.strip_prefix('\'') {
                    text.push('\'');
                    cursor = doubled;
                } else {
                    cursor = after;
                    break;
                }
            }
        }
    }
    *input = cursor;
    text
}

fn ws(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        .parse_next(input)
}

fn integer(input: &mut &str) -> ModalResult<i64> {
    dec_int.parse_next(input)
}

fn eat(input: &mut &str, c: char) -> bool {
    match input.strip_prefix(c) {
        Some(rest) => {
            *input = rest;
            true
        }
        None => false,
    }
}

fn expect(input: &mut &str, c: char) -> ModalResult<()> {
    if eat(input, c) { Ok(()) } else { Err(cut()) }
}

/// Parse `{ ... }` starting at the opening brace.
fn placeholder(input: &mut &str, in_plural: bool) -> ModalResult<Part> {
    expect(input, '{')?;
    ws(input)?;
    let argument = identifier(input).map_err(|_| cut())?.to_string();
    ws(input)?;
    if eat(input, '}') {
        return Ok(Part::Argument(argument));
    }
    expect(input, ',')?;
    ws(input)?;
    let kind = identifier(input).map_err(|_| cut())?;
    ws(input)?;

    let part = match kind {
        "plural" | "selectordinal" => {
            expect(input, ',')?;
            plural_body(input, argument, kind == "selectordinal")?
        }
        "select" => {
            expect(input, ',')?;
            select_body(input, argument, in_plural)?
        }
        "number" => {
            skip_style(input)?;
            Part::Number(argument)
        }
        _ => {
            skip_style(input)?;
            Part::Argument(argument)
        }
    };
    ws(input)?;
    expect(input, '}')?;
    Ok(part)
}

/// Skip an optional `, style` suffix of a simple argument.
fn skip_style(input: &mut &str) -> ModalResult<()> {
    if eat(input, ',') {
        style_text(input)?;
    }
    Ok(())
}

fn style_text<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_till(0.., |c: char| c == '}' || c == '{').parse_next(input)
}

fn branch(input: &mut &str, in_plural: bool) -> ModalResult<MessageTemplate> {
    ws(input)?;
    expect(input, '{')?;
    let parts = message(input, in_plural)?;
    expect(input, '}')?;
    Ok(MessageTemplate { parts })
}

fn plural_body(input: &mut &str, argument: String, ordinal: bool) -> ModalResult<Part> {
    ws(input)?;
    let mut offset = 0;
    if let Some(rest) = input.strip_prefix("offset:") {
        *input = rest;
        ws(input)?;
        offset = integer(input).map_err(|_| cut())?;
    }

    let mut branches = Vec::new();
    loop {
        ws(input)?;
        if input.is_empty() || input.starts_with('}') {
            break;
        }
        let key = if eat(input, '=') {
            PluralKey::Exact(integer(input).map_err(|_| cut())?)
        } else {
            PluralKey::Category(identifier(input).map_err(|_| cut())?.to_string())
        };
        branches.push((key, branch(input, true)?));
    }

    let has_other = branches
        .iter()
        .any(|(key, _)| matches!(key, PluralKey::Category(c) if c == "other"));
    if !has_other {
        return Err(cut());
    }
    Ok(Part::Plural {
        argument,
        ordinal,
        offset,
        branches,
    })
}

fn select_body(input: &mut &str, argument: String, in_plural: bool) -> ModalResult<Part> {
    let mut branches = Vec::new();
    loop {
        ws(input)?;
        if input.is_empty() || input.starts_with('}') {
            break;
        }
        let key = identifier(input).map_err(|_| cut())?.to_string();
        branches.push((key, branch(input, in_plural)?));
    }
    if !branches.iter().any(|(key, _)| key == "other") {
        return Err(cut());
    }
    Ok(Part::Select { argument, branches })
}
