//! Built-in plugins.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Plugin, PluginError};
use crate::display;
use crate::server::{Channel, ListenerId, OutputParser, ServerInstance};

/// Logs every chat line through `tracing`.
#[derive(Debug)]
pub struct ChatLog {
    parser: OutputParser,
    listener: Mutex<Option<ListenerId>>,
}

impl ChatLog {
    /// # Errors
    ///
    /// Returns an error if the chat pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            parser: OutputParser::new()?,
            listener: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Plugin for ChatLog {
    fn name(&self) -> &str {
        "chat-log"
    }

    async fn init(&self, server: &ServerInstance) -> Result<(), PluginError> {
        let id = server.each(self.parser.chat_pattern().clone(), |found| {
            let player = found.name("player").unwrap_or_default();
            let message = found.name("message").unwrap_or_default();
            tracing::info!(target: "chat", %player, %message, "Chat");
        });
        *self
            .listener
            .lock()
            .map_err(|_| PluginError::Failed("chat-log state poisoned".into()))? = Some(id);
        Ok(())
    }

    async fn cleanup(&self, server: &ServerInstance) -> Result<(), PluginError> {
        let id = self
            .listener
            .lock()
            .map_err(|_| PluginError::Failed("chat-log state poisoned".into()))?
            .take();
        if let Some(id) = id {
            server.off(Channel::Message, id);
        }
        Ok(())
    }
}

/// Announces readiness and exit on the console.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyAnnounce;

#[async_trait]
impl Plugin for ReadyAnnounce {
    fn name(&self) -> &str {
        "ready-announce"
    }

    async fn init(&self, server: &ServerInstance) -> Result<(), PluginError> {
        display::print_ready(server.time_to_ready());
        Ok(())
    }

    async fn cleanup(&self, server: &ServerInstance) -> Result<(), PluginError> {
        if let Some(reason) = server.exit_reason() {
            display::print_exit(reason);
        }
        Ok(())
    }
}
