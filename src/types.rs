//! Core types for schema compilation: the compiled output model and options.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::validators::ValidatorRegistry;

/// Section of the document holding the named type definitions.
pub const DEFINITIONS_KEY: &str = "definitions";

/// Prefix every internal `$ref` must carry.
pub const DEFINITIONS_REF_PREFIX: &str = "#/definitions/";

/// Field names generated by the document store itself (identifier and
/// revision counter). Never emitted in compiled output.
pub const RESERVED_FIELDS: &[&str] = &["_id", "__v"];

/// Keys that belong to the portable property vocabulary. Override keys
/// outside this list are carried through as persistence attributes.
pub const PROPERTY_KEYWORDS: &[&str] = &[
    "type",
    "format",
    "items",
    "$ref",
    "enum",
    "properties",
    "required",
    "description",
    "example",
    "title",
    "readOnly",
    "xml",
    "externalDocs",
];

/// Returns true if the field name is reserved by the document store.
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The fixed set of property types accepted in a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Integer,
    Long,
    Float,
    Double,
    Number,
    String,
    Password,
    Boolean,
    Date,
    DateTime,
    Array,
    Object,
}

impl DeclaredType {
    /// Parse a declared `type` value.
    ///
    /// Returns `None` for types outside the allow-list (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "integer" => Some(DeclaredType::Integer),
            "long" => Some(DeclaredType::Long),
            "float" => Some(DeclaredType::Float),
            "double" => Some(DeclaredType::Double),
            "number" => Some(DeclaredType::Number),
            "string" => Some(DeclaredType::String),
            "password" => Some(DeclaredType::Password),
            "boolean" => Some(DeclaredType::Boolean),
            "date" => Some(DeclaredType::Date),
            "dateTime" => Some(DeclaredType::DateTime),
            "array" => Some(DeclaredType::Array),
            "object" => Some(DeclaredType::Object),
            _ => None,
        }
    }

    /// Object and array types compile to nested descriptor trees.
    pub fn is_composite(&self) -> bool {
        matches!(self, DeclaredType::Array | DeclaredType::Object)
    }
}

/// Formats accepted as refinements of `number`.
pub const NUMBER_FORMATS: &[&str] = &[
    "float", "double", "int32", "int64", "integer", "long", "decimal",
];

/// Primitive storage type of a compiled scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrimitiveType {
    Number,
    String,
    Boolean,
    Date,
}

/// Named validator attached to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorBinding {
    pub name: String,
}

/// Shape of a compiled field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Primitive value, optionally restricted to an ordered set of literals.
    Scalar {
        ty: PrimitiveType,
        enum_values: Option<Vec<Value>>,
    },
    /// Identifier pointing at a document of another (or the same) type.
    Reference { target: Option<String> },
    /// Anonymous sub-document.
    Embedded(FieldMap),
    /// Array whose elements follow the inner descriptor.
    Array(Box<FieldDescriptor>),
}

/// Compiled representation of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub required: bool,
    pub validator: Option<ValidatorBinding>,
    /// Extra persistence attributes from an override (`unique`, `default`, ...).
    pub attributes: Map<String, Value>,
}

impl FieldDescriptor {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            validator: None,
            attributes: Map::new(),
        }
    }

    pub fn scalar(ty: PrimitiveType) -> Self {
        Self::new(FieldKind::Scalar {
            ty,
            enum_values: None,
        })
    }

    pub fn reference(target: Option<String>) -> Self {
        Self::new(FieldKind::Reference { target })
    }

    pub fn array_of(item: FieldDescriptor) -> Self {
        Self::new(FieldKind::Array(Box::new(item)))
    }

    /// True for identifier-reference descriptors.
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. })
    }

    /// Target type name of an identifier reference.
    pub fn target_type(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { target } => target.as_deref(),
            _ => None,
        }
    }

    /// Element descriptor of an array field.
    pub fn items(&self) -> Option<&FieldDescriptor> {
        match &self.kind {
            FieldKind::Array(item) => Some(item),
            _ => None,
        }
    }

    /// Nested fields of an embedded sub-document.
    pub fn fields(&self) -> Option<&FieldMap> {
        match &self.kind {
            FieldKind::Embedded(fields) => Some(fields),
            _ => None,
        }
    }

    /// Primitive type of a scalar field.
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match &self.kind {
            FieldKind::Scalar { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Enum literals of a scalar field, in declared order.
    pub fn enum_values(&self) -> Option<&[Value]> {
        match &self.kind {
            FieldKind::Scalar { enum_values, .. } => enum_values.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for FieldDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.kind {
            FieldKind::Scalar { ty, enum_values } => {
                map.serialize_entry("type", ty)?;
                if let Some(values) = enum_values {
                    map.serialize_entry("enum", values)?;
                }
            }
            FieldKind::Reference { target } => {
                map.serialize_entry("type", "ObjectId")?;
                map.serialize_entry("identifierRef", &true)?;
                if let Some(target) = target {
                    map.serialize_entry("targetType", target)?;
                }
            }
            FieldKind::Embedded(fields) => map.serialize_entry("type", fields)?,
            FieldKind::Array(item) => map.serialize_entry("type", &[item.as_ref()])?,
        }
        if self.required {
            map.serialize_entry("required", &true)?;
        }
        if let Some(validator) = &self.validator {
            map.serialize_entry("validate", &validator.name)?;
        }
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Field name → descriptor, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldDescriptor)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any earlier field of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, field: FieldDescriptor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = field,
            None => self.entries.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, field) in &self.entries {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

/// Compiled body of one named type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaTree {
    /// Object definition: one descriptor per field.
    Fields(FieldMap),
    /// Definition whose root is a primitive or an array.
    Simple(FieldDescriptor),
}

impl SchemaTree {
    pub fn fields(&self) -> Option<&FieldMap> {
        match self {
            SchemaTree::Fields(fields) => Some(fields),
            SchemaTree::Simple(_) => None,
        }
    }

    /// Look up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().and_then(|fields| fields.get(name))
    }
}

/// Sort direction or special kind of one indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDirection {
    Ascending,
    Descending,
    Text,
    Hashed,
    Geo2dSphere,
}

impl IndexDirection {
    /// Parse an index direction (`1`, `-1`, `"asc"`, `"desc"`, `"text"`, ...).
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(IndexDirection::Ascending),
                Some(-1) => Some(IndexDirection::Descending),
                _ => None,
            },
            Value::String(s) => match s.as_str() {
                "asc" | "ascending" => Some(IndexDirection::Ascending),
                "desc" | "descending" => Some(IndexDirection::Descending),
                "text" => Some(IndexDirection::Text),
                "hashed" => Some(IndexDirection::Hashed),
                "2dsphere" => Some(IndexDirection::Geo2dSphere),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Serialize for IndexDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IndexDirection::Ascending => serializer.serialize_i64(1),
            IndexDirection::Descending => serializer.serialize_i64(-1),
            IndexDirection::Text => serializer.serialize_str("text"),
            IndexDirection::Hashed => serializer.serialize_str("hashed"),
            IndexDirection::Geo2dSphere => serializer.serialize_str("2dsphere"),
        }
    }
}

/// Single- or compound-field index registered on a compiled schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed fields in declared order.
    pub fields: Vec<(String, IndexDirection)>,
    pub unique: bool,
    /// Build the index without blocking other operations.
    pub background: bool,
}

impl IndexSpec {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_compound(&self) -> bool {
        self.fields.len() > 1
    }
}

impl Serialize for IndexSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Fields<'a>(&'a [(String, IndexDirection)]);

        impl Serialize for Fields<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (name, direction) in self.0 {
                    map.serialize_entry(name, direction)?;
                }
                map.end()
            }
        }

        struct Options<'a>(&'a IndexSpec);

        impl Serialize for Options<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(None)?;
                if self.0.unique {
                    map.serialize_entry("unique", &true)?;
                }
                map.serialize_entry("background", &self.0.background)?;
                map.end()
            }
        }

        // Rendered as the (fields, options) pair an ODM index call takes.
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&Fields(&self.fields))?;
        seq.serialize_element(&Options(self))?;
        seq.end()
    }
}

/// Final per-type output of the compiler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledSchema {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "fields")]
    pub tree: SchemaTree,
    /// Effective schema options (defaults merged with per-type options).
    pub options: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexSpec>,
    /// Validator module named by the document. Loading it is the caller's job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_module: Option<String>,
}

/// All compiled schemas of one document, in definition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSchemas {
    schemas: Vec<CompiledSchema>,
}

impl CompiledSchemas {
    pub(crate) fn push(&mut self, schema: CompiledSchema) {
        self.schemas.push(schema);
    }

    pub fn get(&self, name: &str) -> Option<&CompiledSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledSchema> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl IntoIterator for CompiledSchemas {
    type Item = CompiledSchema;
    type IntoIter = std::vec::IntoIter<CompiledSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.schemas.into_iter()
    }
}

impl Serialize for CompiledSchemas {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schemas.len()))?;
        for schema in &self.schemas {
            map.serialize_entry(&schema.name, schema)?;
        }
        map.end()
    }
}

/// Options for a compilation run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Out-of-band directives keyed by `"default"`, `"Type"` or `"Type.field"`.
    pub overlay: Option<Value>,
    /// Functions that validator directives may name.
    pub validators: ValidatorRegistry,
}

impl CompileOptions {
    /// Create options with no overlay and an empty validator registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overlay merged onto the definitions before compiling.
    pub fn overlay(mut self, overlay: Value) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Set the validator registry.
    pub fn validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }
}
