//! Dot/bracket path access for `prop` and `context`.
//!
//! Accepted forms: `a.b.c`, `items[0].name`, `matrix[1][2]`, `["a.b"].c`.
//! Numeric dot segments (`items.0`) index arrays and also match object keys
//! spelled as digits.

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub message: String,
    pub position: usize,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.position)
    }
}

impl std::error::Error for PathError {}

fn path_error(message: &str, position: usize) -> PathError {
    PathError {
        message: message.to_string(),
        position,
    }
}

pub fn parse_path(path: &str) -> Result<Vec<PathToken>, PathError> {
    let mut tokens = Vec::new();
    if path.is_empty() {
        return Ok(tokens);
    }

    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    let mut expect_segment = true;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                if expect_segment {
                    return Err(path_error("empty path segment", i));
                }
                expect_segment = true;
                i += 1;
            }
            '[' => {
                let (token, next) = parse_bracket(&chars, i)?;
                tokens.push(token);
                expect_segment = false;
                i = next;
            }
            ']' => return Err(path_error("unexpected ']'", i)),
            _ => {
                if !expect_segment {
                    return Err(path_error("expected '.' or '['", i));
                }
                let start = i;
                while i < chars.len() && !matches!(chars[i], '.' | '[' | ']') {
                    i += 1;
                }
                let segment: String = chars[start..i].iter().collect();
                tokens.push(PathToken::Key(segment));
                expect_segment = false;
            }
        }
    }

    if expect_segment {
        return Err(path_error("path ends with '.'", chars.len()));
    }
    Ok(tokens)
}

fn parse_bracket(chars: &[char], open: usize) -> Result<(PathToken, usize), PathError> {
    let mut i = open + 1;
    match chars.get(i) {
        Some(quote @ ('"' | '\'')) => {
            let quote = *quote;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err(path_error("unterminated quoted key", open));
            }
            let key: String = chars[start..i].iter().collect();
            i += 1;
            if chars.get(i) != Some(&']') {
                return Err(path_error("expected ']' after quoted key", i));
            }
            Ok((PathToken::Key(key), i + 1))
        }
        _ => {
            let start = i;
            while i < chars.len() && chars[i] != ']' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(path_error("unterminated '['", open));
            }
            let raw: String = chars[start..i].iter().collect();
            let index = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| path_error("array index must be a non-negative integer", start))?;
            Ok((PathToken::Index(index), i + 1))
        }
    }
}

pub fn get_path<'a>(value: &'a JsonValue, tokens: &[PathToken]) -> Option<&'a JsonValue> {
    let mut current = value;
    for token in tokens {
        current = match (token, current) {
            (PathToken::Key(key), JsonValue::Object(map)) => map.get(key)?,
            (PathToken::Key(key), JsonValue::Array(items)) => {
                let index = key.parse::<usize>().ok()?;
                items.get(index)?
            }
            (PathToken::Index(index), JsonValue::Array(items)) => items.get(*index)?,
            (PathToken::Index(index), JsonValue::Object(map)) => map.get(&index.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}
