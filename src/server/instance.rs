//! The server instance callers hold: lifecycle, output subscriptions and
//! the command protocol in one handle.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use regex::Regex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::process::launch;
use super::{
    waiter, Channel, CommandChannel, Event, EventBus, ExitReason, Lifecycle, LineMatch, ListenerId,
    ServerError, ServerFactory, ServerState, SpawnError,
};
use crate::display;

#[derive(Debug)]
struct Inner {
    bus: Arc<EventBus>,
    commands: CommandChannel,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
    kill: CancellationToken,
    pid: Option<u32>,
    shutdown_command: String,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.lifecycle.borrow().is_stopped() {
            tracing::debug!(pid = ?self.pid, "Last server handle dropped, killing process");
            self.kill.cancel();
        }
    }
}

/// Handle to a running server.
///
/// Cloning is cheap and every clone refers to the same process. The process
/// is killed once the last clone is dropped.
///
/// Waits (`ready`, `when`, `line`, `command`, `stop`) never time out on
/// their own; wrap them in `tokio::time::timeout` or use
/// [`wait_for`](Self::wait_for) when a bound is needed. Pending waits fail
/// with [`ServerError::Stopped`] when the process exits.
#[derive(Debug, Clone)]
pub struct ServerInstance {
    inner: Arc<Inner>,
}

impl ServerInstance {
    pub(crate) fn spawn(
        factory: &ServerFactory,
        working_dir: &Path,
        args: &[String],
    ) -> Result<Self, SpawnError> {
        let bus = Arc::new(EventBus::new());
        let lifecycle = Arc::new(watch::Sender::new(Lifecycle::new()));

        // Registered first so the stopped flag is set before any other Stop listener runs.
        let on_stop = Arc::clone(&lifecycle);
        bus.on(Channel::Stop, move |event| {
            if let Event::Stop(reason) = event {
                on_stop.send_if_modified(|lifecycle| lifecycle.mark_stopped(*reason));
            }
        });

        let mut commands = CommandChannel::new(&bus);

        let ready_pattern = factory.ready_pattern().clone();
        let on_ready = Arc::clone(&lifecycle);
        let ready_bus: Weak<EventBus> = Arc::downgrade(&bus);
        bus.once_matching(
            Channel::Message,
            move |event| event.line().is_some_and(|line| ready_pattern.is_match(line)),
            move |_| {
                if on_ready.send_if_modified(Lifecycle::mark_ready) {
                    tracing::info!(
                        after = ?on_ready.borrow().ready_after(),
                        "Server is ready"
                    );
                    if let Some(bus) = ready_bus.upgrade() {
                        bus.emit(&Event::Ready);
                    }
                }
            },
        );

        if factory.prints_output() {
            bus.on(Channel::Message, |event| {
                if let Some(line) = event.line() {
                    display::print_output(line);
                }
            });
        }
        if factory.prints_errors() {
            bus.on(Channel::Stderr, |event| {
                if let Some(line) = event.line() {
                    display::print_error(line);
                }
            });
        }

        let process = launch(factory.executable(), args, working_dir, &bus)?;
        commands.attach(process.stdin);

        Ok(Self {
            inner: Arc::new(Inner {
                bus,
                commands,
                lifecycle,
                kill: process.kill,
                pid: process.pid,
                shutdown_command: factory.shutdown_command().to_string(),
            }),
        })
    }

    /// Wait until the ready banner has been printed.
    ///
    /// Resolves at most once per instance; later banners have no effect.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ExitedBeforeReady` if the process exits first.
    pub async fn ready(&self) -> Result<&Self, ServerError> {
        let mut rx = self.inner.lifecycle.subscribe();
        let (ready, exit) = {
            let lifecycle = rx
                .wait_for(|l| l.is_ready() || l.is_stopped())
                .await
                .map_err(|_| ServerError::Stopped)?;
            (lifecycle.is_ready(), lifecycle.exit())
        };

        if ready {
            Ok(self)
        } else {
            Err(ServerError::ExitedBeforeReady(
                exit.unwrap_or(ExitReason::Unknown),
            ))
        }
    }

    #[must_use]
    pub fn state(&self) -> ServerState {
        self.inner.lifecycle.borrow().state()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.lifecycle.borrow().is_ready()
    }

    /// True once the process has actually exited, not merely been asked to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.lifecycle.borrow().is_stopped()
    }

    #[must_use]
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.lifecycle.borrow().exit()
    }

    /// Time from launch until the ready banner.
    #[must_use]
    pub fn time_to_ready(&self) -> Option<Duration> {
        self.inner.lifecycle.borrow().ready_after()
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    /// Write a line to the server console without waiting for output.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Stopped` after the process has exited.
    pub async fn send(&self, text: &str) -> Result<(), ServerError> {
        self.inner.commands.send(text).await
    }

    /// Wait for the next line of output, whatever it is.
    pub fn line(&self) -> impl Future<Output = Result<String, ServerError>> + Send + 'static {
        self.inner.commands.line()
    }

    /// Send a command and return the next line of output.
    ///
    /// Responses are paired with commands purely by order; see
    /// [`CommandChannel`] for the limits of that.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Stopped` if the process has exited or exits
    /// before answering.
    pub async fn command(&self, text: &str) -> Result<String, ServerError> {
        self.inner.commands.command(text).await
    }

    /// Wait for the first subsequent output line matching `pattern`.
    pub fn when(
        &self,
        pattern: Regex,
    ) -> impl Future<Output = Result<LineMatch, ServerError>> + Send + 'static {
        waiter::when(&self.inner.bus, pattern)
    }

    /// Like [`when`](Self::when) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Timeout` when the wait elapses, or
    /// `ServerError::Stopped` if the process exits first.
    pub async fn wait_for(&self, pattern: Regex, timeout: Duration) -> Result<LineMatch, ServerError> {
        tokio::time::timeout(timeout, self.when(pattern))
            .await
            .map_err(|_| ServerError::Timeout)?
    }

    /// Call `callback` for every output line matching `pattern`.
    ///
    /// Remove with [`off`](Self::off) on [`Channel::Message`].
    pub fn each<F>(&self, pattern: Regex, callback: F) -> ListenerId
    where
        F: Fn(LineMatch) + Send + Sync + 'static,
    {
        waiter::each(&self.inner.bus, pattern, callback)
    }

    /// Subscribe to a raw bus channel.
    pub fn on<F>(&self, channel: Channel, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.bus.on(channel, listener)
    }

    /// Remove a listener registered with `on` or `each`.
    pub fn off(&self, channel: Channel, id: ListenerId) -> bool {
        self.inner.bus.off(channel, id)
    }

    /// Wait for the process to exit.
    pub async fn wait_stopped(&self) -> ExitReason {
        let mut rx = self.inner.lifecycle.subscribe();
        let exit = match rx.wait_for(Lifecycle::is_stopped).await {
            Ok(lifecycle) => lifecycle.exit(),
            Err(_) => None,
        };
        exit.unwrap_or(ExitReason::Unknown)
    }

    /// Ask the server to shut down and wait for the process to exit.
    ///
    /// Waits for the exit itself, not for any acknowledgement text.
    /// Returns immediately if the process has already exited.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Io` if the shutdown command cannot be written;
    /// the state then reverts to what it was before the call.
    pub async fn stop(&self) -> Result<ExitReason, ServerError> {
        if let Some(reason) = self.exit_reason() {
            return Ok(reason);
        }

        let requested = self.inner.lifecycle.send_if_modified(Lifecycle::mark_stopping);
        if requested {
            tracing::info!(command = %self.inner.shutdown_command, "Stopping server");
        }

        match self.send(&self.inner.shutdown_command).await {
            Ok(()) | Err(ServerError::Stopped) => {}
            Err(e) => {
                if requested {
                    self.inner.lifecycle.send_if_modified(Lifecycle::cancel_stopping);
                }
                return Err(e);
            }
        }

        Ok(self.wait_stopped().await)
    }

    /// [`stop`](Self::stop), falling back to [`kill`](Self::kill) after `timeout`.
    pub async fn stop_or_kill(&self, timeout: Duration) -> ExitReason {
        match tokio::time::timeout(timeout, self.stop()).await {
            Ok(Ok(reason)) => reason,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Graceful stop failed, killing server");
                self.kill().await
            }
            Err(_) => {
                tracing::warn!(?timeout, "Server did not stop in time, killing it");
                self.kill().await
            }
        }
    }

    /// Forcefully kill the process and wait for it to exit.
    pub async fn kill(&self) -> ExitReason {
        self.inner.lifecycle.send_if_modified(Lifecycle::mark_stopping);
        self.inner.kill.cancel();
        self.wait_stopped().await
    }

    /// Attempt termination by signal with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then kills after the timeout.
    /// On other platforms, falls back to immediate kill.
    pub async fn terminate(&self, timeout: Duration) -> ExitReason {
        #[cfg(unix)]
        {
            self.terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn terminate_unix(&self, timeout: Duration) -> ExitReason {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.inner.pid else {
            return self.kill().await;
        };
        if self.is_stopped() {
            return self.wait_stopped().await;
        }

        self.inner.lifecycle.send_if_modified(Lifecycle::mark_stopping);
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(error = %e, pid, "SIGTERM failed");
        }

        match tokio::time::timeout(timeout, self.wait_stopped()).await {
            Ok(reason) => reason,
            Err(_) => self.kill().await,
        }
    }
}
