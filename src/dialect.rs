//! Document dialect detection.
//!
//! Persistence directives live under a vendor-extension key whose name and
//! reach depend on the document's version. The dialect is detected once per
//! compilation and passed down to everything that reads directives.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CompileError;
use crate::types::json_type_name;

/// Directive key of legacy documents (per-field only).
pub const LEGACY_DIRECTIVE_KEY: &str = "x-mongoose";

/// Directive key of Swagger 2.0+ / OpenAPI documents.
pub const EXTENDED_DIRECTIVE_KEY: &str = "x-swagger-mongoose";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Pre-2.0 documents: field directives only.
    Legacy,
    /// Swagger 2.0+ / OpenAPI: field, type and document level directives,
    /// plus an explicit `$ref` inside field directives.
    Extended,
}

impl Dialect {
    /// Detect the dialect from the document's version fields.
    pub fn detect(document: &Value) -> Self {
        let dialect = if document.get("openapi").is_some() {
            Dialect::Extended
        } else {
            match document.get("swagger").and_then(major_version) {
                Some(major) if major >= 2 => Dialect::Extended,
                _ => Dialect::Legacy,
            }
        };
        debug!(?dialect, key = dialect.directive_key(), "detected document dialect");
        dialect
    }

    /// Returns the directive namespace key for this dialect.
    pub fn directive_key(&self) -> &'static str {
        match self {
            Dialect::Legacy => LEGACY_DIRECTIVE_KEY,
            Dialect::Extended => EXTENDED_DIRECTIVE_KEY,
        }
    }

    /// Whether directive blocks on definitions and the document root are honored.
    pub fn supports_type_directives(&self) -> bool {
        matches!(self, Dialect::Extended)
    }

    /// Get the directive block carried by a property or definition.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidDirective` if the block is not an object.
    pub fn directive<'a>(
        &self,
        value: &'a Value,
        path: &str,
    ) -> Result<Option<&'a Map<String, Value>>, CompileError> {
        let key = self.directive_key();
        match value.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(CompileError::invalid_directive(
                &format!("{}/{}", path, key),
                format!("expected object, got {}", json_type_name(other)),
            )),
        }
    }

    /// The explicit reference carried inside a field directive, if any.
    pub fn explicit_ref<'a>(&self, directive: &'a Map<String, Value>) -> Option<&'a str> {
        match self {
            Dialect::Legacy => None,
            Dialect::Extended => directive.get("$ref").and_then(|r| r.as_str()),
        }
    }
}

fn major_version(version: &Value) -> Option<u64> {
    match version {
        Value::String(s) => s.split('.').next()?.trim().parse().ok(),
        Value::Number(n) => n.as_f64().map(|v| v as u64),
        _ => None,
    }
}
