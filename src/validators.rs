//! Caller-supplied field validators.
//!
//! Schema documents may name a validator for a field. The compiler never loads
//! code itself: callers register the functions up front and the binder checks
//! that every named validator exists.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A named predicate plus the message reported when it rejects a value.
///
/// `{VALUE}` in the message is replaced with the rejected value.
#[derive(Clone)]
pub struct Validator {
    message: String,
    predicate: Predicate,
}

impl Validator {
    pub fn new<F>(message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Run the predicate, returning the rendered message on rejection.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Err(self.message.replace("{VALUE}", &rendered))
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Name → validator mapping supplied to a compilation.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Validator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator under `name`, replacing any previous one.
    pub fn register<F>(mut self, name: impl Into<String>, message: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.insert(name, Validator::new(message, f));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, validator: Validator) {
        self.validators.insert(name.into(), validator);
    }

    pub fn get(&self, name: &str) -> Option<&Validator> {
        self.validators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
