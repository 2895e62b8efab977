// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process change feed for connected clients.
//!
//! Writers publish a typed event {entity, id, op} after each committed
//! state change; subscribers receive the event and decide whether to patch
//! in-memory state or refetch. Events carry no payload diff and are not
//! durable: a client that reconnects refetches.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per topic before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Entity kinds clients can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Plan,
    Group,
    Profile,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Plan => "plan",
            EntityKind::Group => "group",
            EntityKind::Profile => "profile",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(EntityKind::Plan),
            "group" => Ok(EntityKind::Group),
            "profile" => Ok(EntityKind::Profile),
            _ => Err(()),
        }
    }
}

/// What happened to the watched entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Created,
    Updated,
}

/// One change event, scoped by entity kind and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub id: String,
    pub op: ChangeOp,
}

/// Topic registry mapping (entity, id) to a broadcast channel.
///
/// Channels are created lazily on first subscribe and dropped with the
/// registry; publishing to a topic nobody watches is a no-op.
#[derive(Default)]
pub struct ChangeFeed {
    topics: DashMap<String, broadcast::Sender<ChangeEvent>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic_key(entity: EntityKind, id: &str) -> String {
        format!("{}:{}", entity.as_str(), id)
    }

    /// Subscribe to changes of one entity.
    pub fn subscribe(&self, entity: EntityKind, id: &str) -> broadcast::Receiver<ChangeEvent> {
        let key = Self::topic_key(entity, id);
        self.topics
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a change event to whoever is watching.
    pub fn publish(&self, entity: EntityKind, id: &str, op: ChangeOp) {
        let key = Self::topic_key(entity, id);
        if let Some(sender) = self.topics.get(&key) {
            // Err means no live receivers; nothing to deliver
            let _ = sender.send(ChangeEvent {
                entity,
                id: id.to_string(),
                op,
            });
        }
        tracing::debug!(entity = entity.as_str(), id, op = ?op, "Change published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(EntityKind::Plan, "plan-1");

        feed.publish(EntityKind::Plan, "plan-1", ChangeOp::Updated);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ChangeEvent {
                entity: EntityKind::Plan,
                id: "plan-1".to_string(),
                op: ChangeOp::Updated,
            }
        );
    }

    #[tokio::test]
    async fn test_topics_are_scoped_by_id() {
        let feed = ChangeFeed::new();
        let mut watching_other = feed.subscribe(EntityKind::Plan, "plan-2");

        feed.publish(EntityKind::Plan, "plan-1", ChangeOp::Updated);

        assert!(matches!(
            watching_other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let feed = ChangeFeed::new();
        // Must not panic or allocate a topic
        feed.publish(EntityKind::Group, "group-1", ChangeOp::Created);
        assert!(feed.topics.is_empty());
    }

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in [EntityKind::Plan, EntityKind::Group, EntityKind::Profile] {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert!("nonsense".parse::<EntityKind>().is_err());
    }
}
