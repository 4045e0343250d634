//! Invalidation bus - named-topic publish/subscribe.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

/// Name of an invalidation channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(Cow<'static, str>);

impl Topic {
    pub const GROUPS: Topic = Topic(Cow::Borrowed("groups"));
    pub const USERS: Topic = Topic(Cow::Borrowed("users"));
    pub const TEACHERS: Topic = Topic(Cow::Borrowed("teachers"));
    pub const TIMELINE: Topic = Topic(Cow::Borrowed("timeline"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Handler = Arc<dyn Fn() + Send + Sync>;

/// In-process invalidation bus.
///
/// Handlers run synchronously, in registration order, on the thread that
/// calls [`signal`](Self::signal). There is no unsubscribe: handlers live as
/// long as the bus. Handlers must not panic.
///
/// ## Example
///
/// ```rust
/// use rollcall::cache::{InvalidationBus, Topic};
///
/// let bus = InvalidationBus::new();
/// bus.subscribe(Topic::GROUPS, || println!("groups changed"));
/// bus.signal(&Topic::GROUPS);
/// ```
#[derive(Default)]
pub struct InvalidationBus {
    topics: DashMap<Topic, Vec<Handler>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` to run on every signal of `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        debug!("Subscribing handler to topic '{}'", topic);
        self.topics.entry(topic).or_default().push(Arc::new(handler));
    }

    /// Invoke every handler of `topic`. Returns the number of handlers run;
    /// a topic without subscribers is a no-op.
    pub fn signal(&self, topic: &Topic) -> usize {
        // Copy the handler list out so handlers can subscribe without
        // deadlocking on the shard lock.
        let handlers = match self.topics.get(topic) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        debug!("Signalling topic '{}' ({} handlers)", topic, handlers.len());
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    /// Signal several topics, in order.
    pub fn signal_all(&self, topics: &[Topic]) {
        for topic in topics {
            self.signal(topic);
        }
    }

    /// Number of handlers registered for `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.len())
    }

    /// Names of all topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().to_string()).collect()
    }
}

impl fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("topics", &self.topics())
            .finish()
    }
}
