//! Pattern-keyed waits on server output.
//!
//! [`when`] resolves with the first `Message` line matching a pattern after
//! the call; earlier lines are never replayed. [`each`] keeps firing for
//! every match until it is removed with [`EventBus::off`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use regex::Regex;
use tokio::sync::oneshot;

use super::{Channel, EventBus, ListenerId, ServerError};

/// A server output line matched against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    line: String,
    groups: Vec<Option<String>>,
    names: HashMap<String, usize>,
}

impl LineMatch {
    /// Match `line` against `pattern`, capturing every group.
    #[must_use]
    pub fn capture(pattern: &Regex, line: &str) -> Option<Self> {
        let captures = pattern.captures(line)?;
        let groups = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        let names = pattern
            .capture_names()
            .enumerate()
            .filter_map(|(index, name)| name.map(|name| (name.to_string(), index)))
            .collect();

        Some(Self {
            line: line.to_string(),
            groups,
            names,
        })
    }

    /// The whole output line.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The text matched by the whole pattern.
    #[must_use]
    pub fn matched(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Capture group by index; `0` is the whole match.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    /// Capture group by name.
    #[must_use]
    pub fn name(&self, name: &str) -> Option<&str> {
        self.get(*self.names.get(name)?)
    }

    /// Number of groups including the whole match.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Single-use sender that can live inside a `Fn` listener.
struct Slot<T>(Mutex<Option<oneshot::Sender<T>>>);

impl<T> Slot<T> {
    fn new(tx: oneshot::Sender<T>) -> Self {
        Self(Mutex::new(Some(tx)))
    }

    fn fill(&self, value: T) {
        let tx = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            // The waiter may have been dropped; nothing to deliver to then.
            let _ = tx.send(value);
        }
    }
}

/// Wait for the first subsequent line matching `pattern`.
///
/// The subscription is made when this function is called, not when the
/// returned future is first polled. It is removed atomically with the match,
/// so a second matching line never resolves it again. If the process exits
/// first the future resolves with [`ServerError::Stopped`].
pub fn when(
    bus: &EventBus,
    pattern: Regex,
) -> impl Future<Output = Result<LineMatch, ServerError>> + Send + 'static {
    let (tx, rx) = oneshot::channel();
    let slot = Slot::new(tx);
    let pattern = Arc::new(pattern);
    let filter_pattern = Arc::clone(&pattern);

    bus.once_matching(
        Channel::Message,
        move |event| event.line().is_some_and(|line| filter_pattern.is_match(line)),
        move |event| {
            if let Some(found) = event.line().and_then(|line| LineMatch::capture(&pattern, line)) {
                slot.fill(found);
            }
        },
    );

    async move { rx.await.map_err(|_| ServerError::Stopped) }
}

/// Invoke `callback` for every subsequent line matching `pattern`.
///
/// Never removes itself; pass the returned id to [`EventBus::off`] with
/// [`Channel::Message`] to stop.
pub fn each<F>(bus: &EventBus, pattern: Regex, callback: F) -> ListenerId
where
    F: Fn(LineMatch) + Send + Sync + 'static,
{
    bus.on(Channel::Message, move |event| {
        if let Some(found) = event.line().and_then(|line| LineMatch::capture(&pattern, line)) {
            callback(found);
        }
    })
}
