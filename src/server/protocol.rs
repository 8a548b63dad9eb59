//! Send-then-await-next-line command protocol over the server's stdio.
//!
//! The server console has no request ids. A command's response is simply
//! the next line of output, so pairing only holds while the server answers
//! each command with exactly one line, in order. Outstanding [`line`] waiters
//! are served first-in first-out: each output line resolves only the oldest
//! one. Unrelated log output arriving between a command and its answer will
//! be taken as the answer.
//!
//! [`line`]: CommandChannel::line

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use super::{Channel, EventBus, ServerError};

type Input = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct Waiters {
    queue: VecDeque<(u64, oneshot::Sender<String>)>,
    next_id: u64,
    closed: bool,
}

impl Waiters {
    fn push(&mut self) -> (u64, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        // After close the sender is dropped at once and the receiver errors.
        if !self.closed {
            self.queue.push_back((id, tx));
        }
        (id, rx)
    }
}

/// Writes commands to the server and pairs them with response lines.
pub struct CommandChannel {
    input: tokio::sync::Mutex<Option<Input>>,
    waiters: Arc<Mutex<Waiters>>,
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("pending", &lock(&self.waiters).queue.len())
            .finish_non_exhaustive()
    }
}

fn lock(waiters: &Mutex<Waiters>) -> MutexGuard<'_, Waiters> {
    waiters.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommandChannel {
    /// Create a channel fed by `bus` with no input attached yet.
    ///
    /// Registers a `Message` listener that serves waiters and a `Stop`
    /// listener that fails every outstanding waiter and rejects new ones.
    #[must_use]
    pub fn new(bus: &EventBus) -> Self {
        let waiters = Arc::new(Mutex::new(Waiters::default()));

        let on_line = Arc::clone(&waiters);
        bus.on(Channel::Message, move |event| {
            let Some(line) = event.line() else { return };
            let mut line = line.to_string();
            let mut waiters = lock(&on_line);
            // Waiters whose future was dropped are skipped; the line goes to
            // the oldest one still listening.
            while let Some((id, tx)) = waiters.queue.pop_front() {
                if tx.is_closed() {
                    tracing::trace!(waiter = id, "Skipping dropped response waiter");
                    continue;
                }
                match tx.send(line) {
                    Ok(()) => break,
                    Err(returned) => {
                        tracing::trace!(waiter = id, "Response waiter dropped while sending");
                        line = returned;
                    }
                }
            }
        });

        let on_stop = Arc::clone(&waiters);
        bus.on(Channel::Stop, move |_| {
            let dropped = {
                let mut waiters = lock(&on_stop);
                waiters.closed = true;
                std::mem::take(&mut waiters.queue)
            };
            if !dropped.is_empty() {
                tracing::debug!(count = dropped.len(), "Failing pending response waiters");
            }
        });

        Self {
            input: tokio::sync::Mutex::new(None),
            waiters,
        }
    }

    /// Attach the stream commands are written to.
    pub fn attach<W>(&mut self, input: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.input.get_mut() = Some(Box::new(input));
    }

    fn is_closed(&self) -> bool {
        lock(&self.waiters).closed
    }

    /// Write `text` followed by a newline. No acknowledgement is awaited.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Stopped` once the process has exited, or
    /// `ServerError::Io` if the write fails for another reason.
    pub async fn send(&self, text: &str) -> Result<(), ServerError> {
        let mut input = self.input.lock().await;
        self.write_line(&mut input, text).await
    }

    async fn write_line(&self, input: &mut Option<Input>, text: &str) -> Result<(), ServerError> {
        if self.is_closed() {
            return Err(ServerError::Stopped);
        }
        let Some(stream) = input.as_mut() else {
            return Err(ServerError::Stopped);
        };

        tracing::debug!(command = %text, "Sending to server");
        let written = async {
            stream.write_all(text.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                *input = None;
                Err(ServerError::Stopped)
            }
            Err(e) => Err(ServerError::Io(e)),
        }
    }

    /// Wait for the next output line, whatever it contains.
    ///
    /// The waiter is queued when this is called. Resolves with
    /// `ServerError::Stopped` if the process exits first.
    pub fn line(&self) -> impl Future<Output = Result<String, ServerError>> + Send + 'static {
        let (_, rx) = lock(&self.waiters).push();
        async move { rx.await.map_err(|_| ServerError::Stopped) }
    }

    /// Send `text` and wait for the next output line.
    ///
    /// Queuing the waiter and writing happen under the input lock, so
    /// concurrent commands keep the order their responses are expected in.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send); also `ServerError::Stopped` if the
    /// process exits before answering.
    pub async fn command(&self, text: &str) -> Result<String, ServerError> {
        let rx = {
            let mut input = self.input.lock().await;
            let (id, rx) = lock(&self.waiters).push();
            if let Err(e) = self.write_line(&mut input, text).await {
                lock(&self.waiters).queue.retain(|(queued, _)| *queued != id);
                return Err(e);
            }
            rx
        };

        rx.await.map_err(|_| ServerError::Stopped)
    }

    /// Number of `line`/`command` calls still waiting for output.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.waiters)
            .queue
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }
}
