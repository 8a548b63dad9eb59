//! Colored console display for server output and lifecycle events.

use std::io::{self, Write};
use std::time::Duration;

use chrono::Local;
use owo_colors::OwoColorize;

use crate::server::ExitReason;

/// Get current timestamp for console lines.
fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Print a line the server wrote to stdout.
pub fn print_output(line: &str) {
    println!("{} {} {}", timestamp().dimmed(), "[SERVER]".green().bold(), line);
    let _ = io::stdout().flush();
}

/// Print a line the server wrote to stderr.
pub fn print_error(line: &str) {
    eprintln!("{} {} {}", timestamp().dimmed(), "[STDERR]".red().bold(), line.red());
    let _ = io::stderr().flush();
}

/// Print the launch command.
pub fn print_launch(command_line: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[LAUNCH]".blue().bold(),
        command_line.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print that the server finished starting.
pub fn print_ready(after: Option<Duration>) {
    let elapsed = after.map_or(String::new(), |d| format!("(after {:.1}s)", d.as_secs_f64()));
    println!(
        "{} {} Server ready {}",
        timestamp().dimmed(),
        "[READY]".green().bold(),
        elapsed.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print how the server process ended.
pub fn print_exit(reason: ExitReason) {
    if reason.success() {
        println!(
            "{} {} Server stopped ({reason})",
            timestamp().dimmed(),
            "[STOP]".blue().bold()
        );
    } else {
        println!(
            "{} {} Server stopped ({})",
            timestamp().dimmed(),
            "[STOP]".red().bold(),
            reason.to_string().red()
        );
    }
    let _ = io::stdout().flush();
}
