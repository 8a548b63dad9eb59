//! Server process spawning and supervision.
//!
//! Launches the server with piped standard streams and wires them to the
//! instance's [`EventBus`]: stdout lines become `Message` events (in arrival
//! order, from a single reader task), stderr lines become `Stderr` events,
//! and process exit becomes exactly one `Stop` event.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Event, EventBus, LineReader, SpawnError};

/// How long the exit task waits for stdout to drain before emitting `Stop`.
const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the server process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Normal exit with a status code.
    Code(i32),
    /// Killed by a signal (unix only).
    Signal(i32),
    /// The exit status could not be determined.
    Unknown,
}

impl ExitReason {
    /// Classify a process exit status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }

        Self::Unknown
    }

    /// Returns true for a zero exit code.
    #[must_use]
    pub fn success(self) -> bool {
        self == Self::Code(0)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Unknown => write!(f, "unknown exit status"),
        }
    }
}

/// Handles kept by the instance after launch.
///
/// The child itself is owned by the exit task; the instance only keeps the
/// input stream, the pid, and a token that asks the exit task to kill it.
#[derive(Debug)]
pub(crate) struct LaunchedProcess {
    pub(crate) stdin: ChildStdin,
    pub(crate) pid: Option<u32>,
    pub(crate) kill: CancellationToken,
}

/// Spawn `executable` with `args` in `working_dir`, publishing its output on `bus`.
///
/// Listeners that must see the first line of output have to be registered
/// on `bus` before this is called.
pub(crate) fn launch(
    executable: &str,
    args: &[String],
    working_dir: &Path,
    bus: &Arc<EventBus>,
) -> Result<LaunchedProcess, SpawnError> {
    tracing::info!(
        command = %command_line(executable, args),
        cwd = %working_dir.display(),
        "Launching server process"
    );

    let mut child = Command::new(executable)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SpawnError::from_io(executable, e))?;

    let stdin = child.stdin.take().ok_or(SpawnError::MissingStream("stdin"))?;
    let stdout = child.stdout.take().ok_or(SpawnError::MissingStream("stdout"))?;
    let stderr = child.stderr.take().ok_or(SpawnError::MissingStream("stderr"))?;
    let pid = child.id();

    tracing::debug!(pid = ?pid, "Server process spawned");

    let stdout_task = pump_lines(stdout, Arc::clone(bus), Event::Message);
    // Stderr may be held open by grandchildren, so the exit task never waits on it.
    let _stderr_task = pump_lines(stderr, Arc::clone(bus), Event::Stderr);

    let kill = CancellationToken::new();
    tokio::spawn(watch_exit(child, stdout_task, kill.clone(), Arc::clone(bus)));

    Ok(LaunchedProcess { stdin, pid, kill })
}

/// Render a launch command for logs, shell-escaping each token.
#[must_use]
pub fn command_line(executable: &str, args: &[String]) -> String {
    std::iter::once(executable)
        .chain(args.iter().map(String::as_str))
        .map(|token| shell_escape::escape(token.into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pump_lines<R>(stream: R, bus: Arc<EventBus>, wrap: fn(String) -> Event) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let lines = LineReader::new(stream).into_stream();
        tokio::pin!(lines);
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    let event = wrap(line);
                    tracing::trace!(?event, "Server output");
                    bus.emit(&event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read server output");
                    break;
                }
            }
        }
    })
}

async fn watch_exit(
    mut child: Child,
    stdout_task: JoinHandle<()>,
    kill: CancellationToken,
    bus: Arc<EventBus>,
) {
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        () = kill.cancelled() => None,
    };

    let status = match waited {
        Some(status) => status,
        None => {
            tracing::warn!(pid = ?child.id(), "Killing server process");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill server process");
            }
            child.wait().await
        }
    };

    let reason = match status {
        Ok(status) => ExitReason::from_status(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for server process");
            ExitReason::Unknown
        }
    };

    if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, stdout_task)
        .await
        .is_err()
    {
        tracing::warn!("Server stdout still open after exit, dropping remaining output");
    }

    if reason.success() {
        tracing::info!(%reason, "Server process exited");
    } else {
        tracing::warn!(%reason, "Server process exited abnormally");
    }

    bus.emit(&Event::Stop(reason));
    bus.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::Code(0).to_string(), "exit code 0");
        assert_eq!(ExitReason::Signal(9).to_string(), "signal 9");
        assert_eq!(ExitReason::Unknown.to_string(), "unknown exit status");
    }

    #[test]
    fn test_exit_reason_success() {
        assert!(ExitReason::Code(0).success());
        assert!(!ExitReason::Code(1).success());
        assert!(!ExitReason::Signal(15).success());
    }

    #[test]
    fn test_command_line_escapes_tokens() {
        let args = vec![
            "-jar".to_string(),
            "my server.jar".to_string(),
            "nogui".to_string(),
        ];
        assert_eq!(
            command_line("java", &args),
            "java -jar 'my server.jar' nogui"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_emits_lines_then_stop() {
        use std::sync::Mutex;

        use crate::server::Channel;

        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        for channel in [Channel::Message, Channel::Stop] {
            let events = Arc::clone(&events);
            bus.on(channel, move |event| events.lock().unwrap().push(event.clone()));
        }
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        bus.on(Channel::Stop, move |_| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        });

        let args = vec![
            "-c".to_string(),
            "echo one; echo two >&2; echo three; exit 3".to_string(),
        ];
        let _process = launch("sh", &args, Path::new("."), &bus).unwrap();
        rx.await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                Event::Message("one".into()),
                Event::Message("three".into()),
                Event::Stop(ExitReason::Code(3)),
            ]
        );
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let bus = Arc::new(EventBus::new());
        let err = launch("definitely-not-a-real-binary", &[], Path::new("."), &bus).unwrap_err();
        assert!(matches!(err, SpawnError::NotFound(_)));
    }
}
