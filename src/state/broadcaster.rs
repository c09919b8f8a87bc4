use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

const GAMES_LIST_TOPIC: &str = "games-list";
const GAME_TOPIC_PREFIX: &str = "game:";

/// Named channel live updates are published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Listing of the most recent games.
    GamesList,
    /// Current question and team updates of one game.
    Game(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::GamesList => f.write_str(GAMES_LIST_TOPIC),
            Topic::Game(id) => write!(f, "{GAME_TOPIC_PREFIX}{id}"),
        }
    }
}

/// Error returned when a topic name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown topic `{0}`")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == GAMES_LIST_TOPIC {
            return Ok(Topic::GamesList);
        }

        value
            .strip_prefix(GAME_TOPIC_PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(Topic::Game)
            .ok_or_else(|| UnknownTopic(value.to_owned()))
    }
}

/// Identifier of one subscriber within a topic.
pub type SubscriptionId = u64;

/// Handle needed to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Topic the subscriber listens on.
    pub topic: Topic,
    /// Subscriber identifier within the topic.
    pub id: SubscriptionId,
}

/// A live subscription: the handle plus the receiving end of its queue.
pub struct Subscription {
    /// Handle to pass to [`Broadcaster::unsubscribe`].
    pub handle: SubscriptionHandle,
    /// Events published on the topic, in publish order.
    pub receiver: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Topic keyed fan-out hub used by the WebSocket and SSE transports.
#[derive(Default)]
pub struct Broadcaster {
    topics: DashMap<Topic, HashMap<SubscriptionId, mpsc::UnboundedSender<ServerEvent>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create a hub without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber on `topic`.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics.entry(topic).or_default().insert(id, sender);
        debug!(%topic, subscription = id, "subscriber registered");

        Subscription {
            handle: SubscriptionHandle { topic, id },
            receiver,
        }
    }

    /// Remove a subscriber. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let emptied = match self.topics.get_mut(&handle.topic) {
            Some(mut subscribers) => {
                subscribers.remove(&handle.id);
                subscribers.is_empty()
            }
            None => return,
        };

        if emptied {
            self.topics
                .remove_if(&handle.topic, |_, subscribers| subscribers.is_empty());
        }
        debug!(topic = %handle.topic, subscription = handle.id, "subscriber removed");
    }

    /// Deliver `event` to every subscriber of `topic`, returning how many received it.
    ///
    /// Subscribers whose queue is closed are dropped from the topic.
    pub fn publish(&self, topic: Topic, event: ServerEvent) -> usize {
        let Some(mut subscribers) = self.topics.get_mut(&topic) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|id, sender| match sender.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(%topic, subscription = *id, "pruning closed subscriber");
                false
            }
        });
        delivered
    }

    /// Deliver `event` to a single subscriber. Returns `false` if it is gone.
    pub fn publish_to(&self, handle: SubscriptionHandle, event: ServerEvent) -> bool {
        let Some(subscribers) = self.topics.get(&handle.topic) else {
            return false;
        };
        subscribers
            .get(&handle.id)
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
