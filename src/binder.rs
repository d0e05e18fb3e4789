//! Post-compile binding of indices and validators.

use tracing::warn;

use crate::directives::TypeDirectives;
use crate::error::CompileError;
use crate::registry::definition_path;
use crate::types::{CompiledSchema, FieldDescriptor, FieldKind, IndexSpec, SchemaTree};
use crate::validators::ValidatorRegistry;

/// Assemble the compiled schema of one type: tree, options, indices and
/// confirmed validator bindings.
///
/// # Errors
///
/// Returns `CompileError::ValidatorNotFound` if a field names a validator
/// missing from `validators`.
pub fn bind(
    name: &str,
    tree: SchemaTree,
    directives: &TypeDirectives,
    validators: &ValidatorRegistry,
) -> Result<CompiledSchema, CompileError> {
    bind_validators(&tree, validators, &definition_path(name))?;

    let mut schema = CompiledSchema {
        name: name.to_string(),
        tree,
        options: directives.options.clone(),
        indexes: Vec::new(),
        validator_module: directives.validator_module.clone(),
    };
    bind_indexes(&mut schema, &directives.indexes);
    Ok(schema)
}

/// Register index specs on a compiled schema. Empty specs are a no-op.
///
/// Fields missing from the tree are still indexed (the data store accepts
/// them) but logged, since they usually mean a typo in the directive.
pub fn bind_indexes(schema: &mut CompiledSchema, indexes: &[IndexSpec]) {
    for index in indexes {
        for field in index.field_names() {
            if field_at(&schema.tree, field).is_none() {
                warn!(
                    schema = %schema.name,
                    %field,
                    "index references a field not present in the compiled schema"
                );
            }
        }
        schema.indexes.push(index.clone());
    }
}

/// Confirm every validator binding in the tree names a registered function.
///
/// # Errors
///
/// Returns `CompileError::ValidatorNotFound` with the path of the first
/// offending field.
pub fn bind_validators(
    tree: &SchemaTree,
    validators: &ValidatorRegistry,
    path: &str,
) -> Result<(), CompileError> {
    match tree {
        SchemaTree::Fields(fields) => {
            for (name, field) in fields.iter() {
                check_field(field, validators, &format!("{}/properties/{}", path, name))?;
            }
            Ok(())
        }
        SchemaTree::Simple(field) => check_field(field, validators, path),
    }
}

fn check_field(
    field: &FieldDescriptor,
    validators: &ValidatorRegistry,
    path: &str,
) -> Result<(), CompileError> {
    if let Some(binding) = &field.validator {
        if !validators.contains(&binding.name) {
            return Err(CompileError::ValidatorNotFound {
                path: path.to_string(),
                name: binding.name.clone(),
            });
        }
    }

    match &field.kind {
        FieldKind::Embedded(fields) => {
            for (name, nested) in fields.iter() {
                check_field(nested, validators, &format!("{}/properties/{}", path, name))?;
            }
            Ok(())
        }
        FieldKind::Array(item) => check_field(item, validators, &format!("{}/items", path)),
        FieldKind::Scalar { .. } | FieldKind::Reference { .. } => Ok(()),
    }
}

/// Look up a field by dotted path, descending through embedded documents and arrays.
pub fn field_at<'t>(tree: &'t SchemaTree, dotted: &str) -> Option<&'t FieldDescriptor> {
    let mut segments = dotted.split('.');
    let mut current = tree.field(segments.next()?)?;
    for segment in segments {
        let mut container = current;
        while let Some(item) = container.items() {
            container = item;
        }
        current = container.fields()?.get(segment)?;
    }
    Some(current)
}
