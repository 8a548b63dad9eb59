//! Launch descriptor builder for the server process.
//!
//! This module provides a builder pattern for describing how the server is
//! launched, and a [`ServerFactory`] that spawns [`ServerInstance`]s from
//! the finished description.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;

use super::{BuildError, ServerInstance, SpawnError};

/// Banner a vanilla server prints once it accepts commands.
///
/// Readiness detection depends on this exact text; a server build that
/// changes its startup banner needs a custom pattern.
pub const DEFAULT_READY_PATTERN: &str =
    r#"Done \((?P<elapsed>[0-9.,]+)s\)! For help, type "help""#;

/// Command that asks the server to shut down gracefully.
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "stop";

/// Unit for JVM heap bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    M,
    G,
}

impl MemoryUnit {
    fn suffix(self) -> char {
        match self {
            Self::M => 'M',
            Self::G => 'G',
        }
    }
}

impl TryFrom<char> for MemoryUnit {
    type Error = BuildError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'M' => Ok(Self::M),
            'G' => Ok(Self::G),
            _ => Err(BuildError::InvalidMemory(c.to_string())),
        }
    }
}

/// A heap size such as `1024M` or `2G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    pub amount: u32,
    pub unit: MemoryUnit,
}

impl Memory {
    #[must_use]
    pub fn new(amount: u32, unit: MemoryUnit) -> Self {
        Self { amount, unit }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Memory {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::InvalidMemory(s.to_string());
        let trimmed = s.trim();
        let unit_char = trimmed.chars().next_back().ok_or_else(invalid)?;
        let unit = MemoryUnit::try_from(unit_char).map_err(|_| invalid())?;
        let amount = trimmed[..trimmed.len() - unit_char.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        Ok(Self { amount, unit })
    }
}

/// Builder for configuring how the server process is launched.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    executable: String,
    launch_flag: Option<String>,
    file: Option<PathBuf>,
    args: Vec<String>,
    gui: bool,
    max_memory: Option<Memory>,
    min_memory: Option<Memory>,
    print_output: bool,
    print_errors: bool,
    ready_pattern: Option<Regex>,
    shutdown_command: String,
    working_dir: Option<PathBuf>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            executable: "java".to_string(),
            launch_flag: Some("-jar".to_string()),
            file: None,
            args: Vec::new(),
            gui: false,
            max_memory: None,
            min_memory: None,
            print_output: false,
            print_errors: true,
            ready_pattern: None,
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
            working_dir: None,
        }
    }
}

impl ServerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executable to run (default `java`).
    #[must_use]
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Flag placed before the server file (default `-jar`).
    #[must_use]
    pub fn launch_flag(mut self, flag: impl Into<String>) -> Self {
        self.launch_flag = Some(flag.into());
        self
    }

    /// Pass the server file without a preceding flag.
    #[must_use]
    pub fn without_launch_flag(mut self) -> Self {
        self.launch_flag = None;
        self
    }

    /// Server file to launch. Required.
    #[must_use]
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Keep the server GUI. When false (the default) `nogui` is passed.
    #[must_use]
    pub fn gui(mut self, enabled: bool) -> Self {
        self.gui = enabled;
        self
    }

    /// Maximum heap, passed as `-Xmx<amount><unit>`.
    #[must_use]
    pub fn max_memory(mut self, amount: u32, unit: MemoryUnit) -> Self {
        self.max_memory = Some(Memory::new(amount, unit));
        self
    }

    /// Minimum heap, passed as `-Xms<amount><unit>`.
    #[must_use]
    pub fn min_memory(mut self, amount: u32, unit: MemoryUnit) -> Self {
        self.min_memory = Some(Memory::new(amount, unit));
        self
    }

    /// Echo server stdout to the console.
    #[must_use]
    pub fn print_output(mut self, enabled: bool) -> Self {
        self.print_output = enabled;
        self
    }

    /// Echo server stderr to the console (default on).
    #[must_use]
    pub fn print_errors(mut self, enabled: bool) -> Self {
        self.print_errors = enabled;
        self
    }

    /// Line pattern that marks the server as ready.
    #[must_use]
    pub fn ready_pattern(mut self, pattern: Regex) -> Self {
        self.ready_pattern = Some(pattern);
        self
    }

    /// Command `stop()` sends (default `stop`).
    #[must_use]
    pub fn shutdown_command(mut self, command: impl Into<String>) -> Self {
        self.shutdown_command = command.into();
        self
    }

    /// Working directory. Defaults to the directory containing the file.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Finish the description.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::MissingFile` if no file was set, and
    /// `BuildError::NoWorkingDir` if the file path has no file name.
    pub fn build(self) -> Result<ServerFactory, BuildError> {
        let file = self.file.ok_or(BuildError::MissingFile)?;

        let (working_dir, launch_file) = if let Some(dir) = self.working_dir {
            (dir, file.clone())
        } else {
            let name = file
                .file_name()
                .ok_or_else(|| BuildError::NoWorkingDir(file.clone()))?;
            let parent = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (parent, PathBuf::from(name))
        };

        let ready_pattern = match self.ready_pattern {
            Some(pattern) => pattern,
            None => Regex::new(DEFAULT_READY_PATTERN)?,
        };

        Ok(ServerFactory {
            executable: self.executable,
            launch_flag: self.launch_flag,
            file,
            launch_file,
            args: self.args,
            gui: self.gui,
            max_memory: self.max_memory,
            min_memory: self.min_memory,
            print_output: self.print_output,
            print_errors: self.print_errors,
            ready_pattern,
            shutdown_command: self.shutdown_command,
            working_dir,
        })
    }
}

/// Immutable launch description that spawns server instances.
#[derive(Debug, Clone)]
pub struct ServerFactory {
    executable: String,
    launch_flag: Option<String>,
    file: PathBuf,
    launch_file: PathBuf,
    args: Vec<String>,
    gui: bool,
    max_memory: Option<Memory>,
    min_memory: Option<Memory>,
    print_output: bool,
    print_errors: bool,
    ready_pattern: Regex,
    shutdown_command: String,
    working_dir: PathBuf,
}

impl ServerFactory {
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// The server file as configured.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn ready_pattern(&self) -> &Regex {
        &self.ready_pattern
    }

    #[must_use]
    pub fn shutdown_command(&self) -> &str {
        &self.shutdown_command
    }

    #[must_use]
    pub fn prints_output(&self) -> bool {
        self.print_output
    }

    #[must_use]
    pub fn prints_errors(&self) -> bool {
        self.print_errors
    }

    fn args_for(&self, file: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 5);

        if let Some(flag) = &self.launch_flag {
            args.push(flag.clone());
        }
        args.push(file.to_string_lossy().into_owned());

        if !self.gui {
            args.push("nogui".to_string());
        }
        args.extend(self.args.iter().cloned());

        if let Some(max) = self.max_memory {
            args.push(format!("-Xmx{max}"));
        }
        if let Some(min) = self.min_memory {
            args.push(format!("-Xms{min}"));
        }

        args
    }

    /// Arguments passed to the executable when spawned in [`working_dir`](Self::working_dir).
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        self.args_for(&self.launch_file)
    }

    /// The full command line, shell-escaped, for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        super::command_line(&self.executable, &self.args())
    }

    /// Launch a server in the configured working directory.
    ///
    /// Returns as soon as the process is running; await
    /// [`ServerInstance::ready`] before relying on it.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process cannot be started.
    pub fn spawn(&self) -> Result<ServerInstance, SpawnError> {
        ServerInstance::spawn(self, &self.working_dir, &self.args())
    }

    /// Launch a server in `dir` instead of the configured working directory.
    ///
    /// The server file is passed as an absolute path.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the file path cannot be resolved or the
    /// process cannot be started.
    pub fn spawn_in(&self, dir: &Path) -> Result<ServerInstance, SpawnError> {
        let file = std::path::absolute(&self.file)?;
        ServerInstance::spawn(self, dir, &self.args_for(&file))
    }
}
