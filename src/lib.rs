//! MC Supervisor - Run a Minecraft server as a supervised child process.

pub mod config;
pub mod display;
pub mod plugin;
pub mod server;
