//! Document Schema Compiler
//!
//! Compiles Swagger/OpenAPI `definitions` into document-store schema models.
//!
//! Every named definition becomes a tree of field descriptors: primitives,
//! embedded documents, arrays and identifier references to other types.
//! Persistence details the API contract cannot express (references stored as
//! ids, uniqueness, validators, indices) are carried in vendor-extension
//! directives, either inline or in an overlay supplied at compile time.
//!
//! # Example
//!
//! ```
//! use docschema::{compile, CompileOptions};
//! use serde_json::json;
//!
//! let document = json!({
//!     "swagger": "2.0",
//!     "definitions": {
//!         "Human": {
//!             "required": ["name"],
//!             "properties": {
//!                 "_id": { "type": "string" },
//!                 "name": { "type": "string" },
//!                 "father": { "$ref": "#/definitions/Human" }
//!             }
//!         }
//!     }
//! });
//!
//! let schemas = compile(document, &CompileOptions::new()).unwrap();
//! let human = &schemas.get("Human").unwrap().tree;
//!
//! // Reserved store fields never appear in the output
//! assert!(human.field("_id").is_none());
//! assert!(human.field("name").unwrap().required);
//!
//! // Self references become identifier references
//! assert_eq!(human.field("father").unwrap().target_type(), Some("Human"));
//! ```
//!
//! # Directives
//!
//! | Level | Key | Effect |
//! |-------|-----|--------|
//! | field | `type: objectId` | Store as identifier reference |
//! | field | `validator` | Bind a caller-registered validator |
//! | field | other keys | Merged over the property (`unique`, `default`, ...) |
//! | type | `schema-options` | Options for the schema (defaults merged per type) |
//! | type | `exclude-schema` | Leave the type out of the output |
//! | type | `additional-properties` | Extra fields appended to the type |
//! | type | `index` | Single or compound indices |
//! | type | `validators` | Validator module path, reported to the caller |
//!
//! Swagger 2.0+ and OpenAPI documents use the `x-swagger-mongoose` key;
//! older documents use `x-mongoose` and only support field directives.

mod binder;
mod compiler;
mod dialect;
mod directives;
mod error;
mod normalize;
mod registry;
mod types;
mod validators;

pub use binder::{bind_indexes, bind_validators, field_at};
pub use compiler::{compile, compile_with_callback, OBJECT_ID};
pub use dialect::{Dialect, EXTENDED_DIRECTIVE_KEY, LEGACY_DIRECTIVE_KEY};
pub use directives::{merge_overlay, parse_indexes, Directives, TypeDirectives};
pub use error::{CompileError, ErrorKind};
pub use normalize::{normalize, SpecSource};
pub use registry::{ref_target, Registry};
pub use types::{
    CompileOptions, CompiledSchema, CompiledSchemas, DeclaredType, FieldDescriptor, FieldKind,
    FieldMap, IndexDirection, IndexSpec, PrimitiveType, SchemaTree, ValidatorBinding,
    RESERVED_FIELDS,
};
pub use validators::{Validator, ValidatorRegistry};
