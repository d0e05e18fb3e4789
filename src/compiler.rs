//! Schema compilation - turns named definitions into field descriptor trees.
//!
//! Each `compile` call owns a [`CompileContext`] holding the registry, the
//! effective directives and the stack of definitions being compiled. Nothing
//! outlives the call.

use serde_json::{Map, Value};
use tracing::debug;

use crate::binder::bind;
use crate::dialect::Dialect;
use crate::directives::{merge_overlay, Directives};
use crate::error::CompileError;
use crate::normalize::{normalize, SpecSource};
use crate::registry::{definition_path, Registry};
use crate::types::{
    is_reserved, json_type_name, CompileOptions, CompiledSchemas, DeclaredType, FieldDescriptor,
    FieldKind, FieldMap, PrimitiveType, SchemaTree, ValidatorBinding, NUMBER_FORMATS,
    PROPERTY_KEYWORDS,
};

/// Override value marking a field as an identifier reference.
pub const OBJECT_ID: &str = "objectId";

/// Override keys that steer compilation instead of describing the field.
const CONTROL_KEYS: &[&str] = &["validator", "include-ref", "required"];

/// Compile a schema document into one schema per definition.
///
/// Excluded definitions are skipped but stay resolvable as reference targets.
///
/// # Errors
///
/// Returns the first `CompileError` encountered; no partial output is produced.
pub fn compile(
    source: impl Into<SpecSource>,
    options: &CompileOptions,
) -> Result<CompiledSchemas, CompileError> {
    let document = normalize(source.into())?;
    let dialect = Dialect::detect(&document);
    let mut registry = Registry::build(&document, dialect)?;

    if let Some(overlay) = &options.overlay {
        merge_overlay(&mut registry, overlay)?;
    }
    let directives = Directives::collect(&registry)?;

    let mut ctx = CompileContext::new(&registry, &directives);
    let mut schemas = CompiledSchemas::default();

    for (name, definition) in &registry.definitions {
        let type_directives = directives.for_type(name).ok_or_else(|| {
            CompileError::invalid_schema(
                &definition_path(name),
                "no directives collected for definition",
            )
        })?;
        if type_directives.exclude {
            debug!(definition = %name, "definition excluded from output");
            continue;
        }
        debug!(definition = %name, "compiling definition");
        let tree = ctx.compile_definition(name, definition)?;
        schemas.push(bind(name, tree, type_directives, &options.validators)?);
    }

    Ok(schemas)
}

/// Callback-style entry point.
///
/// Calls `callback` exactly once with either the error or the compiled
/// schemas; the other argument is `None`.
pub fn compile_with_callback<F>(source: impl Into<SpecSource>, options: &CompileOptions, callback: F)
where
    F: FnOnce(Option<CompileError>, Option<CompiledSchemas>),
{
    match compile(source, options) {
        Ok(schemas) => callback(None, Some(schemas)),
        Err(err) => callback(Some(err), None),
    }
}

/// Effective `required` value of a definition or embedded object.
#[derive(Debug, Clone, Copy)]
enum Required<'a> {
    Names(&'a [Value]),
    All(bool),
}

impl<'a> Required<'a> {
    fn of(schema: &'a Value, path: &str) -> Result<Self, CompileError> {
        match schema.get("required") {
            None | Some(Value::Null) => Ok(Required::All(false)),
            Some(Value::Bool(all)) => Ok(Required::All(*all)),
            Some(Value::Array(names)) => Ok(Required::Names(names)),
            Some(other) => Err(CompileError::invalid_schema(
                &format!("{}/required", path),
                format!("expected array or boolean, got {}", json_type_name(other)),
            )),
        }
    }

    fn applies_to(&self, field: &str) -> bool {
        match self {
            Required::Names(names) => names.iter().any(|n| n.as_str() == Some(field)),
            Required::All(all) => *all,
        }
    }
}

/// Call-scoped state threaded through every recursive step.
pub(crate) struct CompileContext<'a> {
    registry: &'a Registry,
    directives: &'a Directives,
    dialect: Dialect,
    /// Named definitions currently being compiled, outermost first.
    in_progress: Vec<String>,
}

impl<'a> CompileContext<'a> {
    pub(crate) fn new(registry: &'a Registry, directives: &'a Directives) -> Self {
        Self {
            registry,
            directives,
            dialect: registry.dialect(),
            in_progress: Vec::new(),
        }
    }

    /// Compile one named definition.
    pub(crate) fn compile_definition(
        &mut self,
        name: &str,
        definition: &Value,
    ) -> Result<SchemaTree, CompileError> {
        let path = definition_path(name);
        self.in_progress.push(name.to_string());
        let tree = self.compile_tree(name, definition, &path);
        self.in_progress.pop();
        tree
    }

    fn compile_tree(
        &mut self,
        name: &str,
        definition: &Value,
        path: &str,
    ) -> Result<SchemaTree, CompileError> {
        let directives = self.directives;
        let extra = directives
            .for_type(name)
            .map(|d| &d.additional_properties)
            .filter(|extra| !extra.is_empty());

        if definition.get("properties").is_some() {
            return Ok(SchemaTree::Fields(self.compile_object(definition, extra, path)?));
        }

        match definition.get("type") {
            None | Some(Value::Null) => Ok(SchemaTree::Fields(
                self.compile_object(definition, extra, path)?,
            )),
            Some(Value::String(ty)) if ty == "object" => Ok(SchemaTree::Fields(
                self.compile_object(definition, extra, path)?,
            )),
            Some(_) => {
                // Root is a primitive or array: the whole tree is one descriptor.
                let mut bare = definition.clone();
                strip_directive(&mut bare, self.dialect.directive_key());
                let mut field = self.resolve_field(&bare, path)?;
                field.required = Required::of(definition, path)?.applies_to(name);
                Ok(SchemaTree::Simple(field))
            }
        }
    }

    /// Compile the `properties` of an object schema, then any synthetic ones.
    fn compile_object(
        &mut self,
        schema: &Value,
        extra: Option<&Map<String, Value>>,
        path: &str,
    ) -> Result<FieldMap, CompileError> {
        let required = Required::of(schema, path)?;
        let mut fields = FieldMap::new();

        match schema.get("properties") {
            None | Some(Value::Null) => {}
            Some(Value::Object(properties)) => {
                for (name, property) in properties {
                    let field_path = format!("{}/properties/{}", path, name);
                    if let Some(field) =
                        self.resolve_property(property, name, required, &field_path)?
                    {
                        fields.insert(name.clone(), field);
                    }
                }
            }
            Some(other) => {
                return Err(CompileError::invalid_schema(
                    &format!("{}/properties", path),
                    format!("expected object, got {}", json_type_name(other)),
                ))
            }
        }

        if let Some(extra) = extra {
            for (name, property) in extra {
                let field_path = format!("{}/additional-properties/{}", path, name);
                if let Some(field) = self.resolve_property(property, name, required, &field_path)? {
                    fields.insert(name.clone(), field);
                }
            }
        }

        Ok(fields)
    }

    /// Resolve one property into its descriptor, or `None` if the field is dropped.
    fn resolve_property(
        &mut self,
        property: &Value,
        name: &str,
        required: Required<'_>,
        path: &str,
    ) -> Result<Option<FieldDescriptor>, CompileError> {
        if is_reserved(name) {
            debug!(field = %name, "dropping reserved field");
            return Ok(None);
        }

        let mut field = self.resolve_field(property, path)?;
        // Captured once, at visit time.
        field.required = match self.find_override(property, path)? {
            Some((directive, _)) => match directive.get("required") {
                Some(Value::Bool(b)) => *b,
                None | Some(Value::Null) => required.applies_to(name),
                Some(other) => {
                    return Err(CompileError::invalid_directive(
                        &format!("{}/required", path),
                        format!("expected boolean, got {}", json_type_name(other)),
                    ))
                }
            },
            None => required.applies_to(name),
        };
        Ok(Some(field))
    }

    /// Build the descriptor of a property, ignoring field-level `required`.
    fn resolve_field(&mut self, property: &Value, path: &str) -> Result<FieldDescriptor, CompileError> {
        if !property.is_object() {
            return Err(CompileError::invalid_schema(
                path,
                format!("expected object, got {}", json_type_name(property)),
            ));
        }

        if let Some((directive, via_items)) = self.find_override(property, path)? {
            if via_items {
                let items = property.get("items").unwrap_or(&Value::Null);
                let item = self.apply_override(items, directive, &format!("{}/items", path))?;
                return Ok(FieldDescriptor::array_of(item));
            }
            return self.apply_override(property, directive, path);
        }

        if let Some(reference) = self.reference_of(property, path)? {
            return self.resolve_ref(property, reference, path);
        }

        self.resolve_typed(property, path)
    }

    /// Find an override directive on the property, or failing that on its items.
    fn find_override<'p>(
        &self,
        property: &'p Value,
        path: &str,
    ) -> Result<Option<(&'p Map<String, Value>, bool)>, CompileError> {
        // A directive carrying only `$ref` is a reference marker, not an override.
        let is_override = |d: &Map<String, Value>| d.keys().any(|k| k != "$ref");

        if let Some(directive) = self.dialect.directive(property, path)? {
            if is_override(directive) {
                return Ok(Some((directive, false)));
            }
        }
        if let Some(items) = property.get("items") {
            if let Some(directive) = self.dialect.directive(items, &format!("{}/items", path))? {
                if is_override(directive) {
                    return Ok(Some((directive, true)));
                }
            }
        }
        Ok(None)
    }

    /// The `$ref` of a property: direct, via items, or via an explicit marker.
    fn reference_of<'p>(
        &self,
        property: &'p Value,
        path: &str,
    ) -> Result<Option<&'p str>, CompileError> {
        let items = property.get("items").filter(|items| items.is_object());

        for (candidate, candidate_path) in [
            (Some(property), path.to_string()),
            (items, format!("{}/items", path)),
        ] {
            let Some(candidate) = candidate else {
                continue;
            };
            match candidate.get("$ref") {
                None => {}
                Some(Value::String(reference)) => return Ok(Some(reference.as_str())),
                Some(other) => {
                    return Err(CompileError::invalid_schema(
                        &format!("{}/$ref", candidate_path),
                        format!("expected string, got {}", json_type_name(other)),
                    ))
                }
            }
            if let Some(directive) = self.dialect.directive(candidate, &candidate_path)? {
                if let Some(reference) = self.dialect.explicit_ref(directive) {
                    return Ok(Some(reference));
                }
            }
        }
        Ok(None)
    }

    fn resolve_ref(
        &mut self,
        property: &Value,
        reference: &str,
        path: &str,
    ) -> Result<FieldDescriptor, CompileError> {
        let wrap = is_array_property(property);
        let registry = self.registry;
        let (target_name, target) = registry.resolve_ref(reference, path)?;

        if self.in_progress.iter().any(|name| name == target_name) {
            debug!(target = %target_name, %path, "circular reference compiled as identifier reference");
            let field = FieldDescriptor::reference(Some(target_name.to_string()));
            return Ok(if wrap { FieldDescriptor::array_of(field) } else { field });
        }

        let composite = target.get("properties").is_some()
            || match target.get("type").and_then(|t| t.as_str()) {
                None => true,
                Some(ty) => DeclaredType::parse(ty).is_some_and(|t| t.is_composite()),
            };

        if !composite {
            // Aliased scalar: reuse the target's own declaration.
            let mut alias = target.clone();
            strip_directive(&mut alias, self.dialect.directive_key());
            let target_path = definition_path(target_name);
            self.in_progress.push(target_name.to_string());
            let field = self.resolve_field(&alias, &target_path);
            self.in_progress.pop();
            let field = field?;
            return Ok(if wrap { FieldDescriptor::array_of(field) } else { field });
        }

        let field = match self.compile_definition(target_name, target)? {
            SchemaTree::Fields(fields) => {
                let embedded = FieldDescriptor::new(FieldKind::Embedded(fields));
                if wrap {
                    FieldDescriptor::array_of(embedded)
                } else {
                    embedded
                }
            }
            // An array target is already wrapped once.
            SchemaTree::Simple(mut field) => {
                field.required = false;
                field
            }
        };
        Ok(field)
    }

    /// Map a property with a declared `type` to its descriptor.
    fn resolve_typed(&mut self, property: &Value, path: &str) -> Result<FieldDescriptor, CompileError> {
        let declared = match property.get("type") {
            None | Some(Value::Null) => {
                return Err(CompileError::invalid_schema(path, "property has no type or $ref"))
            }
            Some(Value::String(declared)) => declared,
            Some(other) => {
                return Err(CompileError::UnrecognizedType {
                    path: path.to_string(),
                    declared: other.to_string(),
                })
            }
        };
        let ty = DeclaredType::parse(declared).ok_or_else(|| CompileError::UnrecognizedType {
            path: path.to_string(),
            declared: declared.clone(),
        })?;

        let primitive = match ty {
            DeclaredType::Integer
            | DeclaredType::Long
            | DeclaredType::Float
            | DeclaredType::Double => PrimitiveType::Number,
            DeclaredType::Number => {
                check_number_format(property, path)?;
                PrimitiveType::Number
            }
            DeclaredType::String | DeclaredType::Password => PrimitiveType::String,
            DeclaredType::Boolean => PrimitiveType::Boolean,
            DeclaredType::Date | DeclaredType::DateTime => PrimitiveType::Date,
            DeclaredType::Array => {
                let items_path = format!("{}/items", path);
                let items = property
                    .get("items")
                    .filter(|items| !items.is_null())
                    .ok_or_else(|| CompileError::invalid_schema(path, "array property has no items"))?;
                let item = self.resolve_field(items, &items_path)?;
                return Ok(FieldDescriptor::array_of(item));
            }
            DeclaredType::Object => {
                // Anonymous sub-document, not a named definition.
                let fields = self.compile_object(property, None, path)?;
                return Ok(FieldDescriptor::new(FieldKind::Embedded(fields)));
            }
        };

        let enum_values = match property.get("enum") {
            None | Some(Value::Null) => None,
            Some(Value::Array(values)) => Some(values.clone()),
            Some(other) => {
                return Err(CompileError::invalid_schema(
                    &format!("{}/enum", path),
                    format!("expected array, got {}", json_type_name(other)),
                ))
            }
        };

        Ok(FieldDescriptor::new(FieldKind::Scalar {
            ty: primitive,
            enum_values,
        }))
    }

    /// Build a field from a property whose override directive takes precedence.
    fn apply_override(
        &mut self,
        property: &Value,
        directive: &Map<String, Value>,
        path: &str,
    ) -> Result<FieldDescriptor, CompileError> {
        let key = self.dialect.directive_key();
        let directive_path = format!("{}/{}", path, key);

        let validator = match directive.get("validator") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(ValidatorBinding { name: name.clone() }),
            Some(other) => {
                return Err(CompileError::invalid_directive(
                    &format!("{}/validator", directive_path),
                    format!("expected string, got {}", json_type_name(other)),
                ))
            }
        };

        let mut base = property.clone();
        strip_directive(&mut base, key);

        let mut field = if directive.get("type").and_then(|t| t.as_str()) == Some(OBJECT_ID) {
            let field = FieldDescriptor::reference(self.reference_target(property, directive, path)?);
            if is_array_property(property) {
                FieldDescriptor::array_of(field)
            } else {
                field
            }
        } else if validator.is_some() {
            // Typed as declared; the validator rides along.
            self.resolve_field(&base, path)?
        } else {
            if let Value::Object(merged) = &mut base {
                for (k, v) in directive {
                    if !CONTROL_KEYS.contains(&k.as_str()) {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
            self.resolve_field(&base, path)?
        };

        field.validator = validator;
        for (k, v) in directive {
            if !PROPERTY_KEYWORDS.contains(&k.as_str()) && !CONTROL_KEYS.contains(&k.as_str()) {
                field.attributes.insert(k.clone(), v.clone());
            }
        }
        Ok(field)
    }

    /// Target type of an `objectId` override, unless the override suppresses it.
    fn reference_target(
        &self,
        property: &Value,
        directive: &Map<String, Value>,
        path: &str,
    ) -> Result<Option<String>, CompileError> {
        if directive.get("include-ref") == Some(&Value::Bool(false)) {
            return Ok(None);
        }
        let reference = self
            .dialect
            .explicit_ref(directive)
            .or_else(|| property.get("$ref").and_then(|r| r.as_str()))
            .or_else(|| {
                property
                    .get("items")
                    .and_then(|items| items.get("$ref"))
                    .and_then(|r| r.as_str())
            });
        match reference {
            None => Ok(None),
            Some(reference) => {
                let (name, _) = self.registry.resolve_ref(reference, path)?;
                Ok(Some(name.to_string()))
            }
        }
    }
}

fn check_number_format(property: &Value, path: &str) -> Result<(), CompileError> {
    match property.get("format") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(format)) if NUMBER_FORMATS.contains(&format.as_str()) => Ok(()),
        Some(other) => Err(CompileError::UnrecognizedFormat {
            path: path.to_string(),
            format: other.as_str().map(String::from).unwrap_or_else(|| other.to_string()),
        }),
    }
}

fn is_array_property(property: &Value) -> bool {
    property.get("type").and_then(|t| t.as_str()) == Some("array")
        || property.get("items").map(Value::is_object).unwrap_or(false)
}

/// Remove the property's own directive block. Directives on `items` stay.
fn strip_directive(property: &mut Value, key: &str) {
    if let Value::Object(map) = property {
        map.remove(key);
    }
}
