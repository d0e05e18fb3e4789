//! Definition registry for a single compilation run.

use serde_json::{Map, Value};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::types::{json_type_name, DEFINITIONS_KEY, DEFINITIONS_REF_PREFIX};

/// Type name → raw definition, plus the directive blocks that apply to it.
///
/// Built fresh for every compilation and dropped when it returns.
#[derive(Debug, Clone)]
pub struct Registry {
    pub(crate) dialect: Dialect,
    pub(crate) definitions: Map<String, Value>,
    /// Document-level directive block (defaults for every type).
    pub(crate) default_directives: Map<String, Value>,
    /// Per-type directive blocks, keyed by type name.
    pub(crate) type_directives: Map<String, Value>,
}

impl Registry {
    /// Build the registry from a normalized document.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidSchema` if `definitions` or one of its
    /// entries is not an object, or `CompileError::InvalidDirective` for a
    /// malformed directive block.
    pub fn build(document: &Value, dialect: Dialect) -> Result<Self, CompileError> {
        let definitions = match document.get(DEFINITIONS_KEY) {
            None => Map::new(),
            Some(Value::Object(defs)) => defs.clone(),
            Some(other) => {
                return Err(CompileError::invalid_schema(
                    "/definitions",
                    format!("expected object, got {}", json_type_name(other)),
                ))
            }
        };

        let mut type_directives = Map::new();
        for (name, definition) in &definitions {
            let path = definition_path(name);
            if !definition.is_object() {
                return Err(CompileError::invalid_schema(
                    &path,
                    format!("expected object, got {}", json_type_name(definition)),
                ));
            }
            if let Some(block) = dialect.directive(definition, &path)? {
                if dialect.supports_type_directives() {
                    type_directives.insert(name.clone(), Value::Object(block.clone()));
                } else {
                    debug!(definition = %name, "ignoring type-level directives in legacy document");
                }
            }
        }

        let mut default_directives = Map::new();
        if let Some(block) = dialect.directive(document, "")? {
            if dialect.supports_type_directives() {
                default_directives = block.clone();
            } else {
                debug!("ignoring document-level directives in legacy document");
            }
        }

        Ok(Self {
            dialect,
            definitions,
            default_directives,
            type_directives,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definition names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resolve a `$ref` to its target name and definition.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvedRef` if the reference is malformed or
    /// names a type absent from the registry.
    pub fn resolve_ref<'a>(
        &'a self,
        reference: &'a str,
        path: &str,
    ) -> Result<(&'a str, &'a Value), CompileError> {
        let unresolved = || CompileError::UnresolvedRef {
            path: path.to_string(),
            reference: reference.to_string(),
        };
        let name = ref_target(reference).ok_or_else(unresolved)?;
        let definition = self.definitions.get(name).ok_or_else(unresolved)?;
        Ok((name, definition))
    }
}

/// Extract the type name from a `#/definitions/<Name>` reference.
pub fn ref_target(reference: &str) -> Option<&str> {
    let name = reference.strip_prefix(DEFINITIONS_REF_PREFIX)?;
    if name.is_empty() || name.contains('/') {
        None
    } else {
        Some(name)
    }
}

/// JSON Pointer of a definition, used in error paths.
pub fn definition_path(name: &str) -> String {
    format!("/{}/{}", DEFINITIONS_KEY, name.replace('~', "~0").replace('/', "~1"))
}
