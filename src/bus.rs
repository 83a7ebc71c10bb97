//! Event bus module.
//!
//! Gameplay events, the `EventBus` trait the runtime talks to, and `Bus`,
//! a synchronous in-process implementation.
//!
//! Dispatch is synchronous: `publish` returns only after every handler
//! subscribed to the event's topic has run. Handlers receive the bus they
//! were called from, so they may publish, subscribe or unsubscribe while
//! being dispatched. Nested publishes are bounded by a cascade depth limit,
//! counted per publishing thread.

use crate::entity::EntityRecord;
use crate::ids::{EntityId, Ref};
use crate::resource::RestType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// Routing key for events.
#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    ConditionApplied,
    ConditionRemoved,
    ActionGranted,
    ActionRemoved,
    HealingReceived,
    Rest,
    TurnEnd,
    DamageReceived,
    AttackPerformed,
}

/// A gameplay event. Every variant names the character it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    ConditionApplied {
        character_id: EntityId,
        condition: EntityRecord,
        source: String,
    },
    ConditionRemoved {
        character_id: EntityId,
        condition_ref: Ref,
        reason: String,
    },
    ActionGranted {
        character_id: EntityId,
        action: EntityRecord,
        source: String,
    },
    ActionRemoved {
        character_id: EntityId,
        action_ref: Ref,
    },
    HealingReceived {
        target_id: EntityId,
        amount: u32,
        source: String,
    },
    Rest {
        character_id: EntityId,
        rest_type: RestType,
    },
    TurnEnd {
        character_id: EntityId,
        round: u32,
    },
    DamageReceived {
        target_id: EntityId,
        amount: u32,
    },
    AttackPerformed {
        attacker_id: EntityId,
        target_id: Option<EntityId>,
        weapon_id: String,
        melee: bool,
    },
}

impl GameEvent {
    pub fn topic(&self) -> Topic {
        match self {
            GameEvent::ConditionApplied { .. } => Topic::ConditionApplied,
            GameEvent::ConditionRemoved { .. } => Topic::ConditionRemoved,
            GameEvent::ActionGranted { .. } => Topic::ActionGranted,
            GameEvent::ActionRemoved { .. } => Topic::ActionRemoved,
            GameEvent::HealingReceived { .. } => Topic::HealingReceived,
            GameEvent::Rest { .. } => Topic::Rest,
            GameEvent::TurnEnd { .. } => Topic::TurnEnd,
            GameEvent::DamageReceived { .. } => Topic::DamageReceived,
            GameEvent::AttackPerformed { .. } => Topic::AttackPerformed,
        }
    }

    /// The character this event is about. For attacks, the attacker.
    pub fn subject(&self) -> &EntityId {
        match self {
            GameEvent::ConditionApplied { character_id, .. }
            | GameEvent::ConditionRemoved { character_id, .. }
            | GameEvent::ActionGranted { character_id, .. }
            | GameEvent::ActionRemoved { character_id, .. }
            | GameEvent::Rest { character_id, .. }
            | GameEvent::TurnEnd { character_id, .. } => character_id,
            GameEvent::HealingReceived { target_id, .. }
            | GameEvent::DamageReceived { target_id, .. } => target_id,
            GameEvent::AttackPerformed { attacker_id, .. } => attacker_id,
        }
    }

    pub fn is_for(&self, id: &EntityId) -> bool {
        self.subject() == id
    }
}

/// Opaque handle for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Publishing nested deeper than the configured limit.
    #[error("event cascade depth exceeded: depth {depth}, max {max}, topic {topic}")]
    CascadeDepthExceeded { depth: u32, max: u32, topic: Topic },

    /// A handler refused the event.
    #[error("handler failed on {topic}: {message}")]
    Handler { topic: Topic, message: String },
}

impl BusError {
    pub fn handler(topic: Topic, message: impl fmt::Display) -> Self {
        BusError::Handler {
            topic,
            message: message.to_string(),
        }
    }
}

/// Event callback. Receives the event and the bus dispatching it.
pub type Handler = Arc<dyn Fn(&GameEvent, &dyn EventBus) -> Result<(), BusError> + Send + Sync>;

/// Synchronous publish/subscribe interface.
///
/// `unsubscribe` is idempotent: releasing an unknown or already released
/// handle succeeds.
pub trait EventBus: Send + Sync {
    fn subscribe(&self, topic: Topic, handler: Handler) -> Result<SubscriptionId, BusError>;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError>;

    /// Dispatch to every handler of the event's topic, in subscription
    /// order. Stops at the first handler error and returns it.
    fn publish(&self, event: &GameEvent) -> Result<(), BusError>;
}

struct Entry {
    topic: Topic,
    handler: Handler,
}

/// In-process [`EventBus`].
///
/// # Examples
///
/// ```rust
/// use charsmith::bus::{Bus, EventBus, GameEvent, Topic};
/// use charsmith::EntityId;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let bus = Bus::new();
/// let seen = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&seen);
/// let id = bus
///     .subscribe(Topic::TurnEnd, Arc::new(move |_, _| {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }))
///     .unwrap();
///
/// let event = GameEvent::TurnEnd { character_id: EntityId::new("hero"), round: 1 };
/// bus.publish(&event).unwrap();
/// bus.unsubscribe(id).unwrap();
/// bus.publish(&event).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct Bus {
    handlers: Mutex<BTreeMap<SubscriptionId, Entry>>,
    next_id: AtomicU64,
    /// In-flight publish depth of each thread currently dispatching.
    depths: Mutex<HashMap<ThreadId, u32>>,
    max_depth: u32,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the calling thread's publish depth when a dispatch frame ends.
struct DepthGuard<'a> {
    bus: &'a Bus,
    thread: ThreadId,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut depths = self.bus.depths();
        if let Some(depth) = depths.get_mut(&self.thread) {
            *depth -= 1;
            if *depth == 0 {
                depths.remove(&self.thread);
            }
        }
    }
}

impl Bus {
    pub const DEFAULT_MAX_DEPTH: u32 = 10;

    pub fn new() -> Self {
        Self::with_max_depth(Self::DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            depths: Mutex::new(HashMap::new()),
            max_depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, Entry>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn depths(&self) -> MutexGuard<'_, HashMap<ThreadId, u32>> {
        self.depths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> (u32, DepthGuard<'_>) {
        let thread = thread::current().id();
        let depth = {
            let mut depths = self.depths();
            let depth = depths.entry(thread).or_insert(0);
            *depth += 1;
            *depth
        };
        (depth, DepthGuard { bus: self, thread })
    }

    /// Number of live subscriptions across all topics.
    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }

    pub fn topic_subscription_count(&self, topic: Topic) -> usize {
        self.lock().values().filter(|e| e.topic == topic).count()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Nesting depth of in-flight publishes on the calling thread.
    pub fn depth(&self) -> u32 {
        self.depths()
            .get(&thread::current().id())
            .copied()
            .unwrap_or(0)
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

impl EventBus for Bus {
    fn subscribe(&self, topic: Topic, handler: Handler) -> Result<SubscriptionId, BusError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().insert(id, Entry { topic, handler });
        tracing::trace!(subscription = %id, %topic, "subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        if self.lock().remove(&id).is_some() {
            tracing::trace!(subscription = %id, "unsubscribed");
        }
        Ok(())
    }

    fn publish(&self, event: &GameEvent) -> Result<(), BusError> {
        let topic = event.topic();
        let (depth, _guard) = self.enter();
        if depth > self.max_depth {
            tracing::warn!(depth, max = self.max_depth, %topic, "event cascade depth exceeded");
            return Err(BusError::CascadeDepthExceeded {
                depth,
                max: self.max_depth,
                topic,
            });
        }

        // Handlers run without the lock held so they can re-enter the bus.
        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.topic == topic)
            .map(|(id, e)| (*id, Arc::clone(&e.handler)))
            .collect();

        tracing::trace!(%topic, handlers = snapshot.len(), depth, "publishing");
        for (id, handler) in snapshot {
            // Skip handlers released by an earlier handler in this dispatch.
            if !self.is_subscribed(id) {
                continue;
            }
            handler(event, self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn turn_end(id: &str) -> GameEvent {
        GameEvent::TurnEnd {
            character_id: EntityId::new(id),
            round: 1,
        }
    }

    #[test]
    fn test_topic_routing() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(
            Topic::Rest,
            Arc::new(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
        assert_eq!(bus.topic_subscription_count(Topic::Rest), 1);
        assert_eq!(bus.topic_subscription_count(Topic::TurnEnd), 0);

        bus.publish(&turn_end("a")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.publish(&GameEvent::Rest {
            character_id: EntityId::new("a"),
            rest_type: RestType::LongRest,
        })
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let o = Arc::clone(&order);
            bus.subscribe(
                Topic::TurnEnd,
                Arc::new(move |_, _| {
                    o.lock().unwrap().push(n);
                    Ok(())
                }),
            )
            .unwrap();
        }
        bus.publish(&turn_end("a")).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = Bus::new();
        let id = bus.subscribe(Topic::Rest, Arc::new(|_, _| Ok(()))).unwrap();
        assert_eq!(bus.subscription_count(), 1);
        bus.unsubscribe(id).unwrap();
        bus.unsubscribe(id).unwrap();
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_handler_error_stops_dispatch() {
        let bus = Bus::new();
        let after = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            Topic::TurnEnd,
            Arc::new(|e, _| Err(BusError::handler(e.topic(), "boom"))),
        )
        .unwrap();
        let a = Arc::clone(&after);
        bus.subscribe(
            Topic::TurnEnd,
            Arc::new(move |_, _| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
        let err = bus.publish(&turn_end("a")).unwrap_err();
        assert!(matches!(err, BusError::Handler { .. }));
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_publish_and_depth_limit() {
        let bus = Bus::with_max_depth(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        bus.subscribe(
            Topic::TurnEnd,
            Arc::new(move |e, bus| {
                c.fetch_add(1, Ordering::SeqCst);
                bus.publish(e)
            }),
        )
        .unwrap();
        let err = bus.publish(&turn_end("a")).unwrap_err();
        assert!(matches!(
            err,
            BusError::CascadeDepthExceeded { depth: 4, max: 3, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn test_depth_is_counted_per_thread() {
        let bus = Arc::new(Bus::with_max_depth(1));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicUsize::new(0));
        let (i, o) = (Arc::clone(&inside), Arc::clone(&overlapped));
        bus.subscribe(
            Topic::TurnEnd,
            Arc::new(move |_, _| {
                i.fetch_add(1, Ordering::SeqCst);
                let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
                while i.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
                    thread::yield_now();
                }
                if i.load(Ordering::SeqCst) == 2 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
        )
        .unwrap();

        let workers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || bus.publish(&turn_end(id)))
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), Ok(()));
        }
        // Both dispatches were in flight at once without tripping the limit.
        assert_eq!(overlapped.load(Ordering::SeqCst), 2);
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_skips_handler() {
        let bus = Arc::new(Bus::new());
        let later_hits = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let v = Arc::clone(&victim);
        bus.subscribe(
            Topic::TurnEnd,
            Arc::new(move |_, bus| {
                if let Some(id) = *v.lock().unwrap() {
                    bus.unsubscribe(id)?;
                }
                Ok(())
            }),
        )
        .unwrap();
        let l = Arc::clone(&later_hits);
        let id = bus
            .subscribe(
                Topic::TurnEnd,
                Arc::new(move |_, _| {
                    l.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        *victim.lock().unwrap() = Some(id);

        bus.publish(&turn_end("a")).unwrap();
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_subject() {
        let e = GameEvent::HealingReceived {
            target_id: EntityId::new("cleric-target"),
            amount: 5,
            source: "cure_wounds".into(),
        };
        assert_eq!(e.topic(), Topic::HealingReceived);
        assert!(e.is_for(&EntityId::new("cleric-target")));
        assert!(!e.is_for(&EntityId::new("someone-else")));
    }
}
