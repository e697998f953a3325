//! The restricted SKILL.md front matter dialect.
//!
//! Skill files open with a `---` fenced block of `key: value` pairs. Values
//! are typed explicitly rather than sniffed from raw text: `true`/`false`
//! are booleans, `[a, b]` is an array of strings, anything else is a string
//! with optional surrounding quotes stripped. `name` and `description` are
//! the recognized keys and must be strings; everything else rides in an
//! ordered metadata map.
//!
//! This is deliberately not YAML. Nested mappings, multi-line scalars, and
//! anchors are out of the dialect and rejected as malformed lines.

use std::collections::BTreeMap;

use thiserror::Error;

/// Front matter parse failures.
#[derive(Debug, Error)]
pub enum FrontMatterError {
    /// The document does not start with a `---` fence.
    #[error("missing opening front matter fence")]
    MissingFence,

    /// The opening fence is never closed.
    #[error("unterminated front matter block")]
    Unterminated,

    /// A line inside the block does not follow the dialect.
    #[error("malformed front matter line {line}: {reason}")]
    BadLine {
        /// 1-based line number in the document.
        line: usize,
        /// What the line should have looked like.
        reason: String,
    },
}

/// One typed front matter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A plain string, quotes stripped.
    String(String),
    /// A `true`/`false` literal.
    Bool(bool),
    /// A bracket-delimited list of strings.
    List(Vec<String>),
}

impl Value {
    /// The string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Parsed front matter: the recognized keys plus the ordered remainder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    /// The `name:` key.
    pub name: Option<String>,
    /// The `description:` key.
    pub description: Option<String>,
    /// Every other key, in sorted order.
    pub extra: BTreeMap<String, Value>,
}

/// Parse a skill document. Returns the front matter and the body following
/// the closing fence.
pub fn parse(document: &str) -> Result<(FrontMatter, String), FrontMatterError> {
    let mut lines = document.lines().enumerate();
    match lines.next() {
        Some((_, first)) if first.trim_end() == "---" => {}
        _ => return Err(FrontMatterError::MissingFence),
    }

    let mut fm = FrontMatter::default();
    let mut body = Vec::new();
    let mut in_body = false;

    for (idx, line) in lines {
        if in_body {
            body.push(line);
            continue;
        }
        if line.trim_end() == "---" {
            in_body = true;
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = trimmed.split_once(':') else {
            return Err(FrontMatterError::BadLine {
                line: idx + 1,
                reason: "expected `key: value`".into(),
            });
        };
        let key = key.trim();
        let value = parse_value(raw.trim());
        match key {
            "name" => match value {
                Value::String(s) => fm.name = Some(s),
                _ => {
                    return Err(FrontMatterError::BadLine {
                        line: idx + 1,
                        reason: "`name` must be a string".into(),
                    });
                }
            },
            "description" => match value {
                Value::String(s) => fm.description = Some(s),
                _ => {
                    return Err(FrontMatterError::BadLine {
                        line: idx + 1,
                        reason: "`description` must be a string".into(),
                    });
                }
            },
            _ => {
                fm.extra.insert(key.to_string(), value);
            }
        }
    }

    if !in_body {
        return Err(FrontMatterError::Unterminated);
    }
    Ok((fm, body.join("\n")))
}

fn parse_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if raw.starts_with('[') && raw.ends_with(']') => {
            let items = raw[1..raw.len() - 1]
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .filter(|item| !item.is_empty())
                .collect();
            Value::List(items)
        }
        _ => Value::String(unquote(raw).to_string()),
    }
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// The default SKILL.md generated for skills with no stored content.
///
/// Deterministic for a given name and description; the virtual synthesizer
/// depends on that.
pub fn skill_template(name: &str, description: &str) -> String {
    format!("---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n\n{description}\n")
}
