//! Server lifecycle state machine.

use std::time::{Duration, Instant};

use super::ExitReason;

/// Current state of a server instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerState {
    /// Process launched, ready banner not seen yet.
    #[default]
    Starting,
    /// Ready banner observed.
    Ready,
    /// `stop()` was called; waiting for the process to exit.
    Stopping,
    /// The process has exited. Terminal.
    Stopped,
}

/// Tracks lifecycle transitions and the facts they record.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ServerState,
    started_at: Instant,
    ready_after: Option<Duration>,
    exit: Option<ExitReason>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ServerState::Starting,
            started_at: Instant::now(),
            ready_after: None,
            exit: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Time from launch to the ready banner, if it was seen.
    #[must_use]
    pub fn ready_after(&self) -> Option<Duration> {
        self.ready_after
    }

    #[must_use]
    pub fn exit(&self) -> Option<ExitReason> {
        self.exit
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_after.is_some()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.exit.is_some()
    }

    fn transition(&mut self, new_state: ServerState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        self.state = new_state;
    }

    /// Record the ready banner. Returns false if it had no effect.
    pub fn mark_ready(&mut self) -> bool {
        if self.ready_after.is_some() || self.exit.is_some() {
            return false;
        }
        self.ready_after = Some(self.started_at.elapsed());
        if self.state == ServerState::Starting {
            self.transition(ServerState::Ready);
        }
        true
    }

    /// Record a shutdown request. Returns false once already stopping or stopped.
    pub fn mark_stopping(&mut self) -> bool {
        match self.state {
            ServerState::Starting | ServerState::Ready => {
                self.transition(ServerState::Stopping);
                true
            }
            ServerState::Stopping | ServerState::Stopped => false,
        }
    }

    /// Undo a shutdown request that never reached the server.
    ///
    /// Returns to `Ready` or `Starting` depending on whether the banner was
    /// seen. Returns false unless currently stopping.
    pub fn cancel_stopping(&mut self) -> bool {
        if self.state != ServerState::Stopping {
            return false;
        }
        let previous = if self.ready_after.is_some() {
            ServerState::Ready
        } else {
            ServerState::Starting
        };
        self.transition(previous);
        true
    }

    /// Record process exit. Only the first call has an effect.
    pub fn mark_stopped(&mut self, reason: ExitReason) -> bool {
        if self.exit.is_some() {
            return false;
        }
        self.exit = Some(reason);
        self.transition(ServerState::Stopped);
        true
    }
}
