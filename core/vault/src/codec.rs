//! Text form of a node handed to the external program.
//!
//! Strings are edited as raw text, objects as TOML documents and every other
//! value as a single TOML value. Decoding is driven by the kind the node had
//! before editing, never by what the edited text looks like.

use serde_json::{Map, Number, Value};
use std::fmt;

use crate::tree::Node;
use treevault_common::{Error, Result, SensitiveBytes};

/// Key the single-value form is parsed under.
const SCALAR_KEY: &str = "value";
const SCALAR_PREFIX: &str = "value = ";

/// How a node is rendered for editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A string, edited verbatim.
    Text,
    /// An object, edited as a TOML document.
    Table,
    /// Any other value, edited as one TOML value.
    Scalar,
}

impl NodeKind {
    /// Classify a value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => NodeKind::Text,
            Value::Object(_) => NodeKind::Table,
            _ => NodeKind::Scalar,
        }
    }

    /// File name suffix for the temporary file, so editors pick a syntax.
    pub fn file_suffix(self) -> &'static str {
        match self {
            NodeKind::Text => ".txt",
            NodeKind::Table | NodeKind::Scalar => ".toml",
        }
    }
}

/// Position of a decode failure in the edited text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, in characters.
    pub column: usize,
    /// The full offending line, without its line terminator.
    pub source_line: String,
}

/// The edited text does not decode into the node's kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Parser message.
    pub message: String,
    /// Where it went wrong, when the parser knows.
    pub location: Option<Location>,
}

impl DecodeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    fn at(message: impl Into<String>, text: &[u8], offset: usize) -> Self {
        Self {
            message: message.into(),
            location: Some(locate(text, offset)),
        }
    }

    /// Map a TOML error on text that had `prefix` bytes prepended back onto
    /// the text the user saw.
    fn from_toml(err: &toml::de::Error, text: &[u8], prefix: usize) -> Self {
        let message = err.message().trim().to_string();
        match err.span() {
            Some(span) => Self::at(message, text, span.start.saturating_sub(prefix)),
            None => Self::new(message),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "line {}, column {}: {}",
                loc.line, loc.column, self.message
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Render a node for editing.
///
/// # Errors
/// - [`Error::Serialization`] if the value holds something TOML cannot
///   express (`null`, integers above `i64::MAX`)
pub fn encode(node: &Node) -> Result<SensitiveBytes> {
    let not_representable = |e: toml::ser::Error| {
        Error::Serialization(format!(
            "{} cannot be edited as TOML: {}",
            node.address(),
            e
        ))
    };

    let text = match (node.kind(), node.value()) {
        (NodeKind::Text, Value::String(s)) => s.clone(),
        (NodeKind::Table, value) => toml::to_string(value).map_err(not_representable)?,
        (_, value) => {
            let mut text = toml::Value::try_from(value)
                .map_err(not_representable)?
                .to_string();
            text.push('\n');
            text
        }
    };

    Ok(SensitiveBytes::new(text.into_bytes()))
}

/// Parse edited text back into a value of the given kind.
pub fn decode(kind: NodeKind, text: &[u8]) -> std::result::Result<Value, DecodeError> {
    match kind {
        NodeKind::Text => decode_text(text),
        NodeKind::Table => decode_table(text),
        NodeKind::Scalar => decode_scalar(text),
    }
}

fn as_utf8(text: &[u8]) -> std::result::Result<&str, DecodeError> {
    std::str::from_utf8(text).map_err(|e| {
        DecodeError::at("edited text is not valid UTF-8", text, e.valid_up_to())
    })
}

fn decode_text(text: &[u8]) -> std::result::Result<Value, DecodeError> {
    let text = as_utf8(text)?;
    let text = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);
    Ok(Value::String(text.to_string()))
}

fn decode_table(text: &[u8]) -> std::result::Result<Value, DecodeError> {
    let source = as_utf8(text)?;
    let table: toml::Table =
        toml::from_str(source).map_err(|e| DecodeError::from_toml(&e, text, 0))?;
    Ok(Value::Object(table_to_json(table)?))
}

fn decode_scalar(text: &[u8]) -> std::result::Result<Value, DecodeError> {
    let source = as_utf8(text)?;
    let wrapped = format!("{}{}", SCALAR_PREFIX, source);
    let mut table: toml::Table = toml::from_str(&wrapped)
        .map_err(|e| DecodeError::from_toml(&e, text, SCALAR_PREFIX.len()))?;

    if table.len() != 1 {
        return Err(DecodeError::new("expected a single value"));
    }
    let value = table
        .remove(SCALAR_KEY)
        .ok_or_else(|| DecodeError::new("expected a single value"))?;
    toml_to_json(value)
}

fn table_to_json(table: toml::Table) -> std::result::Result<Map<String, Value>, DecodeError> {
    table
        .into_iter()
        .map(|(key, value)| Ok((key, toml_to_json(value)?)))
        .collect()
}

fn toml_to_json(value: toml::Value) -> std::result::Result<Value, DecodeError> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| DecodeError::new(format!("{} cannot be stored", f)))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(toml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(table_to_json(table)?),
    })
}

/// Line, column and line text for a byte offset.
fn locate(text: &[u8], offset: usize) -> Location {
    let offset = offset.min(text.len());
    let line_start = text[..offset]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let line_end = text[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(text.len(), |i| offset + i);

    let line = text[..line_start].iter().filter(|&&b| b == b'\n').count() + 1;
    let column = String::from_utf8_lossy(&text[line_start..offset])
        .chars()
        .count()
        + 1;
    let source_line = String::from_utf8_lossy(&text[line_start..line_end])
        .trim_end_matches('\r')
        .to_string();

    Location {
        line,
        column,
        source_line,
    }
}
