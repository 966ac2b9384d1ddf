//! Snapshot — the full set of entities at one point in time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Mapping from entity key to its latest [`Entity`] record.
///
/// Each key maps to at most one record. Serialized exactly like the
/// transport's JSON map (`{"light.x": {...}, ...}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entities: HashMap<String, Entity>,
}

impl Snapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entity by key.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Insert or replace an entity record, keyed by its `entity_id`.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.entity_id.clone(), entity)
    }

    /// Return a copy of this snapshot with `entity` inserted or replaced.
    #[must_use]
    pub fn with(mut self, entity: Entity) -> Self {
        self.insert(entity);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

impl FromIterator<Entity> for Snapshot {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        let entities = iter
            .into_iter()
            .map(|entity| (entity.entity_id.clone(), entity))
            .collect();
        Self { entities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, state: &str) -> Entity {
        Entity::builder().entity_id(id).state(state).build().unwrap()
    }

    #[test]
    fn should_keep_one_record_per_key() {
        let snapshot: Snapshot = vec![entity("light.a", "on"), entity("light.a", "off")]
            .into_iter()
            .collect();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("light.a").unwrap().state, "off");
    }

    #[test]
    fn should_return_none_for_missing_key() {
        let snapshot = Snapshot::new().with(entity("light.a", "on"));
        assert!(snapshot.get("light.b").is_none());
        assert!(snapshot.get("light.a").is_some());
    }

    #[test]
    fn should_replace_record_on_insert() {
        let mut snapshot = Snapshot::new();
        assert!(snapshot.insert(entity("light.a", "on")).is_none());
        let previous = snapshot.insert(entity("light.a", "off")).unwrap();
        assert_eq!(previous.state, "on");
        assert_eq!(snapshot.get("light.a").unwrap().state, "off");
    }

    #[test]
    fn should_deserialize_transport_map() {
        let json = r#"{
            "light.bedroom": {"entity_id": "light.bedroom", "state": "on"},
            "sensor.temp": {"entity_id": "sensor.temp", "state": "21.5", "attributes": {"unit": "C"}}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("sensor.temp").unwrap().state, "21.5");
    }
}
