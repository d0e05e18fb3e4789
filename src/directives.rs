//! Persistence directives: overlay merging and per-type directive collection.
//!
//! Directives come from three places, weakest first:
//!
//! 1. the document-level block (defaults for every type),
//! 2. the block on each definition,
//! 3. an out-of-band overlay supplied by the caller.
//!
//! The overlay is written onto the call-scoped [`Registry`] before anything is
//! compiled, so later stages only ever see the merged result.
//!
//! # Overlay format
//!
//! ```json
//! {
//!   "default": { "schema-options": { "timestamps": true } },
//!   "Pet": { "schema-options": { "timestamps": false } },
//!   "Person.login": { "unique": true }
//! }
//! ```

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CompileError;
use crate::registry::{definition_path, Registry};
use crate::types::{json_type_name, IndexDirection, IndexSpec};

pub const SCHEMA_OPTIONS: &str = "schema-options";
pub const EXCLUDE_SCHEMA: &str = "exclude-schema";
pub const ADDITIONAL_PROPERTIES: &str = "additional-properties";
pub const INDEX: &str = "index";
pub const VALIDATORS: &str = "validators";

/// Keys recognized in a type-level directive block.
pub const TYPE_DIRECTIVE_KEYS: &[&str] = &[
    SCHEMA_OPTIONS,
    EXCLUDE_SCHEMA,
    ADDITIONAL_PROPERTIES,
    INDEX,
    VALIDATORS,
];

/// Overlay entry applying to every type.
pub const DEFAULT_OVERLAY_KEY: &str = "default";

/// Effective directives of one type after defaults and overrides are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDirectives {
    pub options: Map<String, Value>,
    pub exclude: bool,
    /// Synthetic properties appended after the declared ones.
    pub additional_properties: Map<String, Value>,
    pub indexes: Vec<IndexSpec>,
    pub validator_module: Option<String>,
}

/// Effective directives for every definition of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    by_type: HashMap<String, TypeDirectives>,
}

impl Directives {
    /// Collect the effective directives of every definition in the registry.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::InvalidDirective` for malformed directive values.
    pub fn collect(registry: &Registry) -> Result<Self, CompileError> {
        let mut by_type = HashMap::new();
        for name in registry.names() {
            let block = effective_block(
                &registry.default_directives,
                registry.type_directives.get(name).and_then(|v| v.as_object()),
            );
            let path = format!("{}/{}", definition_path(name), registry.dialect.directive_key());
            by_type.insert(name.to_string(), parse_type_directives(&block, &path)?);
        }
        Ok(Self { by_type })
    }

    pub fn for_type(&self, name: &str) -> Option<&TypeDirectives> {
        self.by_type.get(name)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.for_type(name).map(|d| d.exclude).unwrap_or(false)
    }
}

/// Merge an overlay onto the registry.
///
/// # Errors
///
/// Returns `CompileError::BadRefPath` if a dotted path names a type or field
/// that does not exist, or `CompileError::InvalidDirective` if the overlay or
/// one of its values is not an object.
pub fn merge_overlay(registry: &mut Registry, overlay: &Value) -> Result<(), CompileError> {
    let entries = match overlay {
        Value::Null => return Ok(()),
        Value::Object(entries) => entries,
        other => {
            return Err(CompileError::invalid_directive(
                "overlay",
                format!("expected object, got {}", json_type_name(other)),
            ))
        }
    };

    for (path, value) in entries {
        let Some(directive) = value.as_object() else {
            return Err(CompileError::invalid_directive(
                path,
                format!("expected object, got {}", json_type_name(value)),
            ));
        };

        if path == DEFAULT_OVERLAY_KEY {
            // A bare options object is shorthand for `schema-options`.
            let is_shorthand = !directive
                .keys()
                .any(|k| TYPE_DIRECTIVE_KEYS.contains(&k.as_str()));
            if is_shorthand {
                let mut wrapped = Map::new();
                wrapped.insert(SCHEMA_OPTIONS.to_string(), value.clone());
                deep_merge(&mut registry.default_directives, &wrapped);
            } else {
                deep_merge(&mut registry.default_directives, directive);
            }
            debug!("merged default overlay directives");
            continue;
        }

        let mut segments = path.split('.');
        let type_name = segments.next().unwrap_or_default();
        let fields: Vec<&str> = segments.collect();

        if !registry.contains(type_name) {
            return Err(CompileError::BadRefPath { path: path.clone() });
        }

        if fields.is_empty() {
            let block = registry
                .type_directives
                .entry(type_name.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !block.is_object() {
                *block = Value::Object(Map::new());
            }
            if let Value::Object(block) = block {
                deep_merge(block, directive);
            }
            debug!(definition = %type_name, "merged type overlay directives");
            continue;
        }

        let key = registry.dialect.directive_key();
        let property = registry
            .definitions
            .get_mut(type_name)
            .and_then(|definition| property_mut(definition, &fields))
            .ok_or_else(|| CompileError::BadRefPath { path: path.clone() })?;
        let Value::Object(property) = property else {
            return Err(CompileError::BadRefPath { path: path.clone() });
        };
        let block = property
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !block.is_object() {
            *block = Value::Object(Map::new());
        }
        if let Value::Object(block) = block {
            deep_merge(block, directive);
        }
        debug!(%path, "merged field overlay directives");
    }

    Ok(())
}

/// Walk `properties` of nested objects along the dotted field path.
fn property_mut<'a>(definition: &'a mut Value, fields: &[&str]) -> Option<&'a mut Value> {
    let mut current = definition;
    for field in fields {
        current = current.get_mut("properties")?.get_mut(*field)?;
    }
    Some(current)
}

/// Recursively merge `source` into `target`; `source` wins on conflicts.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Default block with the type block laid over it. Schema options merge key
/// by key; every other directive is replaced wholesale.
fn effective_block(
    defaults: &Map<String, Value>,
    per_type: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut block = defaults.clone();
    let Some(per_type) = per_type else {
        return block;
    };
    for (key, value) in per_type {
        match (key.as_str(), block.get_mut(key), value) {
            (SCHEMA_OPTIONS, Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (option, setting) in incoming {
                    existing.insert(option.clone(), setting.clone());
                }
            }
            _ => {
                block.insert(key.clone(), value.clone());
            }
        }
    }
    block
}

fn parse_type_directives(
    block: &Map<String, Value>,
    path: &str,
) -> Result<TypeDirectives, CompileError> {
    let mut directives = TypeDirectives::default();

    if let Some(options) = block.get(SCHEMA_OPTIONS) {
        directives.options = expect_object(options, &format!("{}/{}", path, SCHEMA_OPTIONS))?;
    }

    match block.get(EXCLUDE_SCHEMA) {
        None | Some(Value::Null) => {}
        Some(Value::Bool(exclude)) => directives.exclude = *exclude,
        Some(other) => {
            return Err(CompileError::invalid_directive(
                &format!("{}/{}", path, EXCLUDE_SCHEMA),
                format!("expected boolean, got {}", json_type_name(other)),
            ))
        }
    }

    if let Some(extra) = block.get(ADDITIONAL_PROPERTIES) {
        directives.additional_properties =
            expect_object(extra, &format!("{}/{}", path, ADDITIONAL_PROPERTIES))?;
    }

    if let Some(index) = block.get(INDEX) {
        directives.indexes = parse_indexes(index, &format!("{}/{}", path, INDEX))?;
    }

    match block.get(VALIDATORS) {
        None | Some(Value::Null) => {}
        Some(Value::String(module)) => directives.validator_module = Some(module.clone()),
        Some(other) => {
            return Err(CompileError::invalid_directive(
                &format!("{}/{}", path, VALIDATORS),
                format!("expected string, got {}", json_type_name(other)),
            ))
        }
    }

    Ok(directives)
}

fn expect_object(value: &Value, path: &str) -> Result<Map<String, Value>, CompileError> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(CompileError::invalid_directive(
            path,
            format!("expected object, got {}", json_type_name(other)),
        )),
    }
}

/// Parse an `index` directive.
///
/// Accepts a single spec, an array of specs, or an object of named specs.
/// A spec is either `{"fields": {..}, "unique": bool}` or a flat field map
/// whose `unique` key becomes the uniqueness option.
pub fn parse_indexes(value: &Value, path: &str) -> Result<Vec<IndexSpec>, CompileError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| parse_index_spec(entry, &format!("{}/{}", path, i)))
            .collect(),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        Value::Object(map) if map.contains_key("fields") => Ok(vec![parse_index_spec(value, path)?]),
        Value::Object(map) if map.values().all(Value::is_object) => map
            .iter()
            .map(|(name, entry)| parse_index_spec(entry, &format!("{}/{}", path, name)))
            .collect(),
        Value::Object(_) => Ok(vec![parse_index_spec(value, path)?]),
        other => Err(CompileError::invalid_directive(
            path,
            format!("expected object or array, got {}", json_type_name(other)),
        )),
    }
}

fn parse_index_spec(entry: &Value, path: &str) -> Result<IndexSpec, CompileError> {
    let Some(map) = entry.as_object() else {
        return Err(CompileError::invalid_directive(
            path,
            format!("expected object, got {}", json_type_name(entry)),
        ));
    };

    let (field_map, explicit) = match map.get("fields") {
        Some(Value::Object(fields)) => (fields, true),
        Some(other) => {
            return Err(CompileError::invalid_directive(
                &format!("{}/fields", path),
                format!("expected object, got {}", json_type_name(other)),
            ))
        }
        None => (map, false),
    };

    let mut spec = IndexSpec {
        fields: Vec::new(),
        unique: flag(map, "unique", false, path)?,
        background: flag(map, "background", true, path)?,
    };

    for (field, direction) in field_map {
        // Options share the map with field names in the flat form.
        if !explicit && (field == "unique" || field == "background") {
            continue;
        }
        let direction = IndexDirection::parse(direction).ok_or_else(|| {
            CompileError::invalid_directive(
                &format!("{}/{}", path, field),
                format!("unsupported index direction {}", direction),
            )
        })?;
        spec.fields.push((field.clone(), direction));
    }

    if spec.fields.is_empty() {
        return Err(CompileError::invalid_directive(path, "index has no fields"));
    }
    Ok(spec)
}

fn flag(map: &Map<String, Value>, key: &str, default: bool, path: &str) -> Result<bool, CompileError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(CompileError::invalid_directive(
            &format!("{}/{}", path, key),
            format!("expected boolean, got {}", json_type_name(other)),
        )),
    }
}
