//! Instance-owned publish/subscribe bus.
//!
//! Each server instance owns one bus. Delivery is synchronous and in
//! registration order. Emission works on a snapshot taken under the lock,
//! so listeners may subscribe or unsubscribe from inside a callback; those
//! changes only take effect for later emissions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::ExitReason;

/// Named channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// One event per stdout line.
    Message,
    /// One event per stderr line. Never mixed into `Message`.
    Stderr,
    /// The ready banner was observed.
    Ready,
    /// The process exited.
    Stop,
}

/// Payload delivered on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(String),
    Stderr(String),
    Ready,
    Stop(ExitReason),
}

impl Event {
    /// Channel this event is published on.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Self::Message(_) => Channel::Message,
            Self::Stderr(_) => Channel::Stderr,
            Self::Ready => Channel::Ready,
            Self::Stop(_) => Channel::Stop,
        }
    }

    /// Line text for `Message` and `Stderr` events.
    #[must_use]
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::Message(line) | Self::Stderr(line) => Some(line),
            _ => None,
        }
    }
}

/// Identity of a registered listener, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;
type Filter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

struct Subscriber {
    id: ListenerId,
    listener: Listener,
    filter: Option<Filter>,
    once: bool,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<Channel, Vec<Subscriber>>,
    next_id: u64,
    closed: bool,
}

/// Publish/subscribe bus keyed by [`Channel`].
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("EventBus")
            .field("channels", &registry.channels.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(
        &self,
        channel: Channel,
        listener: Listener,
        filter: Option<Filter>,
        once: bool,
    ) -> ListenerId {
        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;

        if registry.closed {
            tracing::trace!(?channel, "Bus closed, dropping new listener");
            return id;
        }

        registry.channels.entry(channel).or_default().push(Subscriber {
            id,
            listener,
            filter,
            once,
        });
        id
    }

    /// Register a durable listener.
    pub fn on<F>(&self, channel: Channel, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(channel, Arc::new(listener), None, false)
    }

    /// Register a listener that fires for the next event and is then removed.
    pub fn once<F>(&self, channel: Channel, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(channel, Arc::new(listener), None, true)
    }

    /// Register a listener that fires for the first event accepted by
    /// `filter` and is then removed.
    ///
    /// The filter runs while the bus is locked and removal happens in the
    /// same critical section, so the listener fires at most once even under
    /// concurrent emission. Filters must not touch the bus.
    pub fn once_matching<P, F>(&self, channel: Channel, filter: P, listener: F) -> ListenerId
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(channel, Arc::new(listener), Some(Box::new(filter)), true)
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub fn off(&self, channel: Channel, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let Some(subscribers) = registry.channels.get_mut(&channel) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|sub| sub.id != id);
        before != subscribers.len()
    }

    /// Deliver `event` to every listener on its channel.
    ///
    /// Returns the number of listeners invoked. Emitting to a channel with
    /// no listeners is a no-op.
    pub fn emit(&self, event: &Event) -> usize {
        let snapshot: Vec<Listener> = {
            let mut registry = self.lock();
            let Some(subscribers) = registry.channels.get_mut(&event.channel()) else {
                return 0;
            };
            let mut fired = Vec::with_capacity(subscribers.len());
            subscribers.retain(|sub| {
                let hit = sub.filter.as_ref().is_none_or(|filter| filter(event));
                if hit {
                    fired.push(Arc::clone(&sub.listener));
                }
                !(hit && sub.once)
            });
            fired
        };

        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    /// Number of listeners currently registered on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: Channel) -> usize {
        self.lock().channels.get(&channel).map_or(0, Vec::len)
    }

    /// Drop every listener and ignore all future subscriptions.
    pub fn close(&self) {
        let dropped = {
            let mut registry = self.lock();
            registry.closed = true;
            std::mem::take(&mut registry.channels)
        };
        tracing::trace!(channels = dropped.len(), "Event bus closed");
        // Listeners are dropped here, outside the lock; their destructors may
        // wake tasks that touch the bus again.
        drop(dropped);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
