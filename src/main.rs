//! MC Supervisor - Run a Minecraft server as a supervised child process.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mc_supervisor::config::{ConfigError, ConfigLoader, SupervisorConfig};
use mc_supervisor::display;
use mc_supervisor::plugin::PluginRegistry;
use mc_supervisor::server::{
    BuildError, ExitReason, LineReader, ServerError, ServerFactory, ServerInstance, SpawnError,
};

#[derive(Parser)]
#[command(
    name = "mc-supervisor",
    about = "Run a Minecraft server as a supervised child process",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the server and forward console input to it.
    Run(LaunchArgs),
    /// Print the command line that `run` would execute.
    ShowCommand(LaunchArgs),
}

/// Overrides applied on top of the config file.
#[derive(Args)]
struct LaunchArgs {
    /// Config file to use instead of the search path.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Server jar to launch.
    #[arg(long)]
    jar: Option<PathBuf>,
    /// Java executable.
    #[arg(long)]
    java: Option<String>,
    /// Maximum heap, e.g. 2G.
    #[arg(long)]
    max_memory: Option<String>,
    /// Minimum heap, e.g. 512M.
    #[arg(long)]
    min_memory: Option<String>,
    /// Keep the server GUI.
    #[arg(long)]
    gui: bool,
    /// Working directory for the server.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl LaunchArgs {
    fn load(self) -> Result<SupervisorConfig, AppError> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::with_path(path.clone()),
            None => ConfigLoader::new(),
        };
        let mut config = loader.load()?;

        let server = &mut config.server;
        if let Some(jar) = self.jar {
            server.jar = Some(jar);
        }
        if let Some(java) = self.java {
            server.java = java;
        }
        if let Some(max) = self.max_memory {
            server.max_memory = Some(max);
        }
        if let Some(min) = self.min_memory {
            server.min_memory = Some(min);
        }
        if self.gui {
            server.gui = true;
        }
        if let Some(cwd) = self.cwd {
            server.working_dir = Some(cwd);
        }

        Ok(config)
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code(reason: ExitReason) -> ExitCode {
    match reason {
        ExitReason::Code(code) => u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from),
        ExitReason::Signal(_) | ExitReason::Unknown => ExitCode::FAILURE,
    }
}

/// Copy operator input to the server console until either side closes.
async fn forward_stdin(server: ServerInstance) {
    let mut input = LineReader::new(tokio::io::stdin());
    loop {
        match input.next_line().await {
            Ok(Some(line)) => match server.send(&line).await {
                Ok(()) => {}
                Err(ServerError::Stopped) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to forward input");
                    break;
                }
            },
            Ok(None) => {
                tracing::debug!("Operator input closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read operator input");
                break;
            }
        }
    }
}

/// Wait for the server to exit, stopping it when `interrupt` fires.
///
/// If the interrupt handler cannot be installed the server is left running.
async fn supervise<I>(server: &ServerInstance, interrupt: I, stop_timeout: Duration) -> ExitReason
where
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        reason = server.wait_stopped() => reason,
        result = interrupt => match result {
            Ok(()) => {
                tracing::info!("Interrupted, stopping server");
                server.stop_or_kill(stop_timeout).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                server.wait_stopped().await
            }
        }
    }
}

async fn run(config: SupervisorConfig, factory: ServerFactory) -> Result<ExitReason, AppError> {
    let plugins = PluginRegistry::builtin().select(&config.plugins.enabled);
    tracing::info!(plugins = ?plugins.names(), "Starting server");

    display::print_launch(&factory.command_line());
    let server = factory.spawn()?;

    let plugin_task = {
        let server = server.clone();
        tokio::spawn(async move { plugins.run(&server).await })
    };
    tokio::spawn(forward_stdin(server.clone()));

    let reason = supervise(
        &server,
        tokio::signal::ctrl_c(),
        config.server.stop_timeout(),
    )
    .await;

    if let Err(e) = plugin_task.await {
        tracing::warn!(error = %e, "Plugin task failed");
    }
    tracing::info!(%reason, "Server exited");
    Ok(reason)
}

fn dispatch(command: Commands) -> Result<ExitCode, AppError> {
    match command {
        Commands::ShowCommand(args) => {
            let config = args.load()?;
            let factory = config.server.to_builder()?.build()?;
            println!("{}", factory.command_line());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => {
            let config = args.load()?;
            let factory = config.server.to_builder()?.build()?;

            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(run(config, factory));
            // The stdin reader holds a blocking thread until the next line arrives.
            runtime.shutdown_background();
            Ok(exit_code(result?))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "mc-supervisor failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use mc_supervisor::server::ServerBuilder;

    use super::*;

    const SCRIPT: &str = r#"
echo 'Done (0.1s)! For help, type "help"'
while IFS= read -r line; do
  [ "$line" = stop ] && exit 0
done
"#;

    fn spawn_fake(dir: &tempfile::TempDir) -> ServerInstance {
        let path = dir.path().join("server.sh");
        std::fs::write(&path, SCRIPT).unwrap();
        ServerBuilder::new()
            .executable("sh")
            .without_launch_flag()
            .file(path)
            .build()
            .unwrap()
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_interrupt_stops_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = spawn_fake(&dir);
        server.ready().await.unwrap();

        let reason = supervise(&server, async { Ok(()) }, Duration::from_secs(5)).await;
        assert_eq!(reason, ExitReason::Code(0));
    }

    #[tokio::test]
    async fn test_failed_interrupt_handler_leaves_server_running() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = spawn_fake(&dir);
        server.ready().await.unwrap();

        let watched = server.clone();
        let supervised = tokio::spawn(async move {
            supervise(
                &watched,
                async { Err(std::io::Error::other("no signal handler")) },
                Duration::from_secs(5),
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!server.is_stopped());
        assert!(!supervised.is_finished());

        server.stop().await.unwrap();
        assert_eq!(supervised.await.unwrap(), ExitReason::Code(0));
    }
}
