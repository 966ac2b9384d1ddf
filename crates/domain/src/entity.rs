//! Entity — an immutable value record of one piece of external state.
//!
//! An entity is identified by a domain-qualified key (e.g. `light.bedroom`),
//! carries a `state` string and an open-ended attribute map. Updates never
//! mutate a record in place; the transport replaces it wholesale in the next
//! [`Snapshot`](crate::snapshot::Snapshot).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TripwireError, ValidationError};
use crate::time::Timestamp;

/// A single entity record as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// The domain part of the key (`light` for `light.bedroom`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    /// Look up a top-level attribute by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Validation`] when `entity_id` is empty.
    pub fn validate(&self) -> Result<(), TripwireError> {
        if self.entity_id.is_empty() {
            return Err(ValidationError::EmptyEntityKey.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    entity_id: Option<String>,
    state: Option<String>,
    attributes: Map<String, Value>,
    last_changed: Option<Timestamp>,
    last_updated: Option<Timestamp>,
}

impl EntityBuilder {
    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn last_changed(mut self, ts: Timestamp) -> Self {
        self.last_changed = Some(ts);
        self
    }

    #[must_use]
    pub fn last_updated(mut self, ts: Timestamp) -> Self {
        self.last_updated = Some(ts);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// The state defaults to `"unknown"` when not provided.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::Validation`] if the key is missing or empty.
    pub fn build(self) -> Result<Entity, TripwireError> {
        let entity = Entity {
            entity_id: self.entity_id.unwrap_or_default(),
            state: self.state.unwrap_or_else(|| "unknown".to_string()),
            attributes: self.attributes,
            last_changed: self.last_changed,
            last_updated: self.last_updated,
        };
        entity.validate()?;
        Ok(entity)
    }
}
