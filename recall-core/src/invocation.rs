//! Invocation descriptors and argument path navigation.
//!
//! An [`Invocation`] is the normalized description of one call to a cached
//! operation: a stable identity plus an ordered list of named arguments.
//! Arguments are lifted into [`serde_json::Value`] when they are attached so
//! that key derivation and change tracking can inspect them without knowing
//! their concrete types.

use crate::{KeyError, TrackingError};
use serde::Serialize;
use serde_json::{Map, Value};

/// Separator between segments of an argument path (`order.customer.id`).
pub const PATH_SEPARATOR: char = '.';

/// Navigates a dotted field path inside a value.
///
/// This replaces run-time reflection: implementors expose their fields by
/// name and the tracking layer walks them one segment at a time.
pub trait PathResolver {
    /// Resolve `segments` relative to `self`, returning `None` when any
    /// segment is missing or an intermediate value is null.
    fn resolve(&self, segments: &[&str]) -> Option<&Value>;
}

impl PathResolver for Value {
    fn resolve(&self, segments: &[&str]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            current = match current {
                Value::Object(fields) => fields.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// One named argument of an invocation.
#[derive(Debug, Clone)]
pub struct Argument {
    name: String,
    value: Result<Value, String>,
}

impl Argument {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lifted value, or `None` when the argument could not be serialized.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref().ok()
    }
}

/// Normalized description of a single call to a cached operation.
#[derive(Debug, Clone)]
pub struct Invocation {
    owner: String,
    method: String,
    key_prefix: Option<String>,
    arguments: Vec<Argument>,
}

impl Invocation {
    /// Describe a call to `owner.method`.
    pub fn new(owner: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            method: method.into(),
            key_prefix: None,
            arguments: Vec::new(),
        }
    }

    /// Override the default `Owner.method` key prefix.
    ///
    /// Mirrors a target that supplies its own prefix; the override also
    /// selects which configured target settings apply.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Attach the next positional argument.
    ///
    /// Serialization failures are recorded rather than returned so that
    /// building the descriptor never fails; they surface as a
    /// [`KeyError`] during key derivation, which bypasses the cache.
    pub fn arg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.push_arg(name, value);
        self
    }

    /// Attach an argument through a mutable reference.
    pub fn push_arg<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
        let value = serde_json::to_value(value)
            .map(canonicalize)
            .map_err(|e| e.to_string());
        self.arguments.push(Argument {
            name: name.into(),
            value,
        });
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Default identity: `Owner.method`.
    pub fn identity(&self) -> String {
        format!("{}{}{}", self.owner.trim(), PATH_SEPARATOR, self.method.trim())
    }

    /// The prefix used for key derivation and target configuration lookup.
    pub fn key_prefix(&self) -> String {
        match &self.key_prefix {
            Some(prefix) => prefix.trim().to_string(),
            None => self.identity(),
        }
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Look up an argument by parameter name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|arg| arg.name == name)
    }

    /// Look up an argument by position.
    pub fn argument_at(&self, position: usize) -> Option<&Argument> {
        self.arguments.get(position)
    }

    /// Ordered argument values, failing on the first unserializable argument.
    pub fn canonical_arguments(&self) -> Result<Vec<&Value>, KeyError> {
        self.arguments
            .iter()
            .map(|arg| {
                arg.value
                    .as_ref()
                    .map_err(|reason| KeyError::ArgumentNotSerializable {
                        parameter: arg.name.clone(),
                        reason: reason.clone(),
                    })
            })
            .collect()
    }

    /// Resolve a dotted argument path whose first segment names a parameter.
    pub fn resolve_path(&self, path: &str) -> Result<&Value, TrackingError> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).map(str::trim).collect();
        let (parameter, rest) = match segments.split_first() {
            Some((parameter, rest)) if !parameter.is_empty() => (*parameter, rest),
            _ => {
                return Err(TrackingError::ParameterNotFound {
                    parameter: path.to_string(),
                })
            }
        };

        let root = self
            .argument(parameter)
            .ok_or_else(|| TrackingError::ParameterNotFound {
                parameter: parameter.to_string(),
            })?
            .value()
            .ok_or_else(|| TrackingError::PropertyNotFound {
                path: path.to_string(),
            })?;

        root.resolve(rest)
            .ok_or_else(|| TrackingError::PropertyNotFound {
                path: path.to_string(),
            })
    }

    /// Resolve a dotted argument path and render it for use in a token.
    pub fn resolve_token_value(&self, path: &str) -> Result<String, TrackingError> {
        let value = self.resolve_path(path)?;
        render_token_value(value).ok_or_else(|| TrackingError::EmptyValue {
            path: path.to_string(),
        })
    }
}

/// Render a value as it appears after `=` in a validation token.
///
/// Strings render verbatim, scalars through `Display`, compound values as
/// compact JSON. Null and blank strings have no token form.
pub fn render_token_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

/// Rebuild objects with sorted keys so equal values always encode to equal bytes.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(String, Value)> = fields.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (name, value) in entries {
                sorted.insert(name, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
