//! Dependency paths and the dependency-aware change predicate.
//!
//! A [`DependencyPath`] selects a projection of an [`Entity`]: the literal
//! `state`, a top-level field, or a dotted walk into `attributes`
//! (`attributes.changed`, `attributes.colors.0`). Two records "differ" with
//! respect to a dependency list iff at least one path resolves to unequal
//! values, where a missing value is distinct from every present one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::entity::Entity;
use crate::error::ValidationError;

/// A dotted path into an entity record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyPath {
    raw: String,
    segments: Vec<String>,
}

impl DependencyPath {
    /// The `state` path, the default dependency.
    #[must_use]
    pub fn state() -> Self {
        Self {
            raw: "state".to_string(),
            segments: vec!["state".to_string()],
        }
    }

    /// Parse a dotted path.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the path or one of its segments is empty.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyDependencyPath);
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ValidationError::EmptyPathSegment {
                path: raw.to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve this path against an entity record.
    ///
    /// Returns `None` when the path does not exist on the record.
    #[must_use]
    pub fn resolve(&self, entity: &Entity) -> Option<Value> {
        let (head, rest) = self.segments.split_first()?;
        let root = match head.as_str() {
            "state" => Value::String(entity.state.clone()),
            "entity_id" => Value::String(entity.entity_id.clone()),
            "last_changed" => Value::String(entity.last_changed?.to_rfc3339()),
            "last_updated" => Value::String(entity.last_updated?.to_rfc3339()),
            "attributes" => {
                return match rest.split_first() {
                    None => Some(Value::Object(entity.attributes.clone())),
                    Some((key, tail)) => walk(entity.attributes.get(key)?, tail).cloned(),
                };
            }
            _ => return None,
        };
        if rest.is_empty() { Some(root) } else { None }
    }
}

/// Follow object keys and array indices down a JSON value.
fn walk<'a>(mut value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

impl Default for DependencyPath {
    fn default() -> Self {
        Self::state()
    }
}

impl fmt::Display for DependencyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DependencyPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DependencyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for DependencyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Whether `a` and `b` differ on at least one of `deps`.
///
/// A missing entity resolves every path to "missing". Comparison is deep
/// structural equality on the resolved JSON values.
#[must_use]
pub fn is_different(deps: &[DependencyPath], a: Option<&Entity>, b: Option<&Entity>) -> bool {
    deps.iter().any(|dep| {
        let left = a.and_then(|entity| dep.resolve(entity));
        let right = b.and_then(|entity| dep.resolve(entity));
        left != right
    })
}
