//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::server::{BuildError, Memory, ServerBuilder, DEFAULT_SHUTDOWN_COMMAND};

/// How to launch the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Executable to run.
    pub java: String,
    /// Flag before the server file. Empty for none.
    pub launch_flag: String,
    /// Server jar (or script) to launch.
    pub jar: Option<PathBuf>,
    /// Extra arguments, in order.
    pub args: Vec<String>,
    /// Maximum heap, e.g. "2G".
    pub max_memory: Option<String>,
    /// Minimum heap, e.g. "512M".
    pub min_memory: Option<String>,
    /// Keep the server GUI.
    pub gui: bool,
    /// Working directory. Defaults to the jar's directory.
    pub working_dir: Option<PathBuf>,
    /// Echo server stdout to the console.
    pub print_output: bool,
    /// Echo server stderr to the console.
    pub print_errors: bool,
    /// Override for the ready banner regex.
    pub ready_pattern: Option<String>,
    /// Console command used for graceful shutdown.
    pub shutdown_command: String,
    /// Seconds to wait for a graceful stop before killing.
    pub stop_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            launch_flag: "-jar".to_string(),
            jar: None,
            args: Vec::new(),
            max_memory: None,
            min_memory: None,
            gui: false,
            working_dir: None,
            print_output: true,
            print_errors: true,
            ready_pattern: None,
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
            stop_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Translate into a launch builder.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` if a memory bound or the ready pattern is invalid.
    pub fn to_builder(&self) -> Result<ServerBuilder, BuildError> {
        let mut builder = ServerBuilder::new()
            .executable(&self.java)
            .args(self.args.iter().cloned())
            .gui(self.gui)
            .print_output(self.print_output)
            .print_errors(self.print_errors)
            .shutdown_command(&self.shutdown_command);

        builder = if self.launch_flag.is_empty() {
            builder.without_launch_flag()
        } else {
            builder.launch_flag(&self.launch_flag)
        };

        if let Some(jar) = &self.jar {
            builder = builder.file(jar);
        }
        if let Some(dir) = &self.working_dir {
            builder = builder.working_dir(dir);
        }
        if let Some(max) = &self.max_memory {
            let max: Memory = max.parse()?;
            builder = builder.max_memory(max.amount, max.unit);
        }
        if let Some(min) = &self.min_memory {
            let min: Memory = min.parse()?;
            builder = builder.min_memory(min.amount, min.unit);
        }
        if let Some(pattern) = &self.ready_pattern {
            builder = builder.ready_pattern(Regex::new(pattern)?);
        }

        Ok(builder)
    }
}

/// Which plugins to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin names, matched against the registry.
    pub enabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["chat-log".to_string(), "ready-announce".to_string()],
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub server: ServerConfig,
    pub plugins: PluginsConfig,
}
