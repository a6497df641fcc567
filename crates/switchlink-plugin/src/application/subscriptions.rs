//! Per-connection subscription table: entity id → interested consumers.
//!
//! Each subscription also remembers the credentials the consumer attached
//! with, so that entity queries issued on the consumer's behalf (for example
//! after a reconnect) carry that consumer's own player id and token.
//!
//! Ordered maps keep iteration deterministic, which keeps fan-out order and
//! replay order stable.

use std::collections::{BTreeMap, BTreeSet};

use switchlink_core::{Credentials, EntityId};

use crate::domain::ConsumerId;

/// One entity-info query to run, and who should hear about the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub entity_id: EntityId,
    pub credentials: Credentials,
    pub recipients: Vec<ConsumerId>,
}

#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entities: BTreeMap<EntityId, BTreeMap<ConsumerId, Credentials>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `consumer` to `entity_id`. Returns `true` if the pair is new.
    ///
    /// Re-subscribing an existing pair only refreshes its credentials.
    pub fn insert(
        &mut self,
        entity_id: EntityId,
        consumer: ConsumerId,
        credentials: Credentials,
    ) -> bool {
        self.entities
            .entry(entity_id)
            .or_default()
            .insert(consumer, credentials)
            .is_none()
    }

    /// Removes the pair. Returns `true` if it was present.
    ///
    /// The entity's entry is dropped once its last consumer leaves.
    pub fn remove(&mut self, entity_id: EntityId, consumer: &ConsumerId) -> bool {
        let Some(consumers) = self.entities.get_mut(&entity_id) else {
            return false;
        };
        let removed = consumers.remove(consumer).is_some();
        if consumers.is_empty() {
            self.entities.remove(&entity_id);
        }
        removed
    }

    /// Consumers currently subscribed to `entity_id`.
    pub fn consumers_of(&self, entity_id: EntityId) -> Vec<ConsumerId> {
        self.entities
            .get(&entity_id)
            .map(|consumers| consumers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every distinct consumer subscribed to anything.
    pub fn all_consumers(&self) -> Vec<ConsumerId> {
        self.distinct().into_iter().cloned().collect()
    }

    /// Number of distinct consumers; this is the connection's reference count.
    pub fn consumer_count(&self) -> usize {
        self.distinct().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// One query per (entity, consumer) pair, carrying that consumer's own
    /// credentials and addressed to that consumer alone.
    pub fn queries(&self) -> Vec<EntityQuery> {
        self.entities
            .iter()
            .flat_map(|(entity_id, consumers)| {
                consumers.iter().map(|(consumer, credentials)| EntityQuery {
                    entity_id: *entity_id,
                    credentials: *credentials,
                    recipients: vec![consumer.clone()],
                })
            })
            .collect()
    }

    fn distinct(&self) -> BTreeSet<&ConsumerId> {
        self.entities.values().flat_map(|c| c.keys()).collect()
    }
}
