//! Change-tracking specifications.
//!
//! A change-tracking spec lists the entities a cached operation depends on:
//!
//! ```text
//! Order:CustomerId=query.customer.id, Customer, Product:Sku=sku
//! ```
//!
//! Each entry is either a bare entity name or `Entity:Property=path`, where
//! `path` is a dotted path whose first segment names a parameter of the
//! cached call. Specs are parsed once at configuration load; a malformed spec
//! is a [`ConfigError`].

use crate::{ConfigError, Invocation, TrackingError, ValidationToken};
use crate::{PROPERTY_DELIMITER, VALUE_DELIMITER};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separates entries of a change-tracking spec.
pub const ENTRY_SEPARATOR: char = ',';

static ENTITY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("Invalid entity regex")
});

static PROPERTY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid property regex"));

static ARGUMENT_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$").expect("Invalid argument path regex")
});

/// Binds an entity property to a value navigated out of the call arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyBinding {
    pub property: String,
    pub path: String,
}

/// One entity a cached operation depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedTarget {
    pub entity: String,
    pub binding: Option<PropertyBinding>,
}

impl TrackedTarget {
    pub fn entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            binding: None,
        }
    }

    pub fn property(
        entity: impl Into<String>,
        property: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            binding: Some(PropertyBinding {
                property: property.into(),
                path: path.into(),
            }),
        }
    }

    /// The coarse token covering every record of this entity.
    pub fn entity_token(&self) -> ValidationToken {
        ValidationToken::for_entity(&self.entity)
    }

    /// Resolve the token for one call.
    ///
    /// Returns the property-scoped token when the binding's path resolves to
    /// a non-empty value. The error tells the caller to fall back to
    /// [`Self::entity_token`].
    pub fn token_for(&self, invocation: &Invocation) -> Result<ValidationToken, TrackingError> {
        match &self.binding {
            None => Ok(self.entity_token()),
            Some(binding) => {
                let value = invocation.resolve_token_value(&binding.path)?;
                Ok(ValidationToken::for_property(
                    &self.entity,
                    &binding.property,
                    &value,
                ))
            }
        }
    }

    fn parse(entry: &str, spec: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedChangeTracking {
            spec: spec.to_string(),
            reason,
        };

        let (entity, binding) = match entry.split_once(PROPERTY_DELIMITER) {
            None => (entry.trim(), None),
            Some((entity, binding)) => (entity.trim(), Some(binding)),
        };

        if !ENTITY_NAME.is_match(entity) {
            return Err(malformed(format!("invalid entity name '{}'", entity)));
        }

        let Some(binding) = binding else {
            return Ok(Self::entity(entity));
        };

        let (property, path) = binding
            .split_once(VALUE_DELIMITER)
            .ok_or_else(|| malformed(format!("missing '{}' in '{}'", VALUE_DELIMITER, entry)))?;
        let (property, path) = (property.trim(), path.trim());

        if !PROPERTY_NAME.is_match(property) {
            return Err(malformed(format!("invalid property name '{}'", property)));
        }
        if !ARGUMENT_PATH.is_match(path) {
            return Err(malformed(format!("invalid argument path '{}'", path)));
        }

        Ok(Self::property(entity, property, path))
    }
}

impl fmt::Display for TrackedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            None => f.write_str(&self.entity),
            Some(binding) => write!(
                f,
                "{}{}{}{}{}",
                self.entity, PROPERTY_DELIMITER, binding.property, VALUE_DELIMITER, binding.path
            ),
        }
    }
}

/// Parsed change-tracking spec: the ordered, duplicate-free list of
/// entities an operation depends on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChangeTrackingSpec {
    targets: Vec<TrackedTarget>,
}

impl ChangeTrackingSpec {
    /// Parse a spec string. Blank input yields an empty spec.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        if spec.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut targets: Vec<TrackedTarget> = Vec::new();
        for entry in spec.split(ENTRY_SEPARATOR) {
            if entry.trim().is_empty() {
                return Err(ConfigError::MalformedChangeTracking {
                    spec: spec.to_string(),
                    reason: "empty entry".to_string(),
                });
            }
            let target = TrackedTarget::parse(entry, spec)?;
            if targets.iter().any(|t| t.entity == target.entity) {
                return Err(ConfigError::MalformedChangeTracking {
                    spec: spec.to_string(),
                    reason: format!("entity '{}' listed more than once", target.entity),
                });
            }
            targets.push(target);
        }

        Ok(Self { targets })
    }

    pub fn from_targets(targets: Vec<TrackedTarget>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[TrackedTarget] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Display for ChangeTrackingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ENTRY_SEPARATOR)?;
            }
            write!(f, "{}", target)?;
        }
        Ok(())
    }
}

impl FromStr for ChangeTrackingSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChangeTrackingSpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChangeTrackingSpec> for String {
    fn from(spec: ChangeTrackingSpec) -> Self {
        spec.to_string()
    }
}
