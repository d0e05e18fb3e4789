//! Schema document normalization.
//!
//! Accepts a document as JSON text, raw bytes, or an already-parsed value and
//! produces the single canonical `serde_json::Value` the compiler works on.

use serde_json::Value;

use crate::error::CompileError;
use crate::types::json_type_name;

/// A schema document in one of its accepted representations.
#[derive(Debug, Clone)]
pub enum SpecSource {
    Text(String),
    Bytes(Vec<u8>),
    Document(Value),
}

impl From<&str> for SpecSource {
    fn from(text: &str) -> Self {
        SpecSource::Text(text.to_string())
    }
}

impl From<String> for SpecSource {
    fn from(text: String) -> Self {
        SpecSource::Text(text)
    }
}

impl From<&[u8]> for SpecSource {
    fn from(bytes: &[u8]) -> Self {
        SpecSource::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for SpecSource {
    fn from(bytes: Vec<u8>) -> Self {
        SpecSource::Bytes(bytes)
    }
}

impl From<Value> for SpecSource {
    fn from(value: Value) -> Self {
        SpecSource::Document(value)
    }
}

impl From<&Value> for SpecSource {
    fn from(value: &Value) -> Self {
        SpecSource::Document(value.clone())
    }
}

/// Normalize a source into a JSON object document.
///
/// # Errors
///
/// Returns `CompileError::MissingSpec` for empty input, `CompileError::InvalidJson`
/// if text or bytes fail to parse, and `CompileError::NotADocument` if the
/// parsed document is not a JSON object.
pub fn normalize(source: SpecSource) -> Result<Value, CompileError> {
    let document = match source {
        SpecSource::Text(text) => parse_text(&text)?,
        // Bytes and text must behave identically once decoded.
        SpecSource::Bytes(bytes) => parse_bytes(&bytes)?,
        SpecSource::Document(Value::Null) => return Err(CompileError::MissingSpec),
        SpecSource::Document(Value::String(text)) => parse_text(&text)?,
        SpecSource::Document(value) => value,
    };

    match document {
        Value::Object(_) => Ok(document),
        Value::Null => Err(CompileError::MissingSpec),
        other => Err(CompileError::NotADocument {
            actual: json_type_name(&other).to_string(),
        }),
    }
}

fn parse_text(text: &str) -> Result<Value, CompileError> {
    if text.trim().is_empty() {
        return Err(CompileError::MissingSpec);
    }
    serde_json::from_str(text).map_err(|source| CompileError::InvalidJson { source })
}

fn parse_bytes(bytes: &[u8]) -> Result<Value, CompileError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CompileError::MissingSpec);
    }
    serde_json::from_slice(bytes).map_err(|source| CompileError::InvalidJson { source })
}
