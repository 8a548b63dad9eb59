//! A shell script standing in for a Minecraft server.

use std::path::PathBuf;

use mc_supervisor::server::{ServerBuilder, ServerFactory};
use tempfile::TempDir;

/// Prints two startup lines, the ready banner, then answers console input.
pub const VANILLA: &str = r#"
echo "[10:00:00] [Server thread/INFO]: Starting minecraft server version 1.20.1"
echo "[10:00:01] [Server thread/INFO]: <player> op sigmasoldier"
echo '[10:00:03] [Server thread/INFO]: Done (3.2s)! For help, type "help"'
while IFS= read -r line; do
  case "$line" in
    stop)
      echo "[10:00:10] [Server thread/INFO]: Stopping the server"
      exit 0
      ;;
    list)
      echo "[10:00:05] [Server thread/INFO]: There are 1 of a max of 20 players online: sigmasoldier"
      ;;
    banner)
      echo '[10:00:06] [Server thread/INFO]: Done (9.9s)! For help, type "help"'
      ;;
    crash)
      echo "java.lang.OutOfMemoryError" >&2
      exit 3
      ;;
    *)
      echo "[10:00:04] [Server thread/INFO]: echo: $line"
      ;;
  esac
done
"#;

/// Waits for a console line before each startup line, so callers can step
/// through startup one line at a time.
pub const GATED: &str = r#"
read -r go
echo "[10:00:01] [Server thread/INFO]: <player> op sigmasoldier"
read -r go
echo '[10:00:03] [Server thread/INFO]: Done (3.2s)! For help, type "help"'
while IFS= read -r line; do
  case "$line" in
    stop)
      echo "[10:00:10] [Server thread/INFO]: Stopping the server"
      exit 0
      ;;
    *)
      echo "[10:00:04] [Server thread/INFO]: echo: $line"
      ;;
  esac
done
"#;

/// Exits without ever printing the ready banner.
pub const CRASHING: &str = r#"
echo "[10:00:00] [Server thread/INFO]: Loading libraries"
exit 2
"#;

/// Ignores `stop` entirely.
pub const STUBBORN: &str = r#"
echo 'Done (0.1s)! For help, type "help"'
while IFS= read -r line; do
  echo "ignored: $line"
done
"#;

pub struct FakeServer {
    // Held so the script outlives the test.
    _dir: TempDir,
    pub path: PathBuf,
}

impl FakeServer {
    pub fn new(script: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.sh");
        std::fs::write(&path, script).unwrap();
        Self { _dir: dir, path }
    }

    pub fn builder(&self) -> ServerBuilder {
        ServerBuilder::new()
            .executable("sh")
            .without_launch_flag()
            .file(&self.path)
            .print_errors(false)
    }

    pub fn factory(&self) -> ServerFactory {
        self.builder().build().unwrap()
    }
}
