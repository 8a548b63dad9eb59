//! Structured extraction from server console lines.
//!
//! Console output is not a stable format, so every parser here returns
//! `None` for lines it does not recognise instead of an error.

use regex::Regex;

use super::{ServerError, ServerInstance};

/// Players reported by the `list` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerList {
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
}

/// A chat line such as `<Steve> hello`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub player: String,
    pub message: String,
}

/// Compiled patterns for recognising console lines.
#[derive(Debug, Clone)]
pub struct OutputParser {
    player_list: Regex,
    chat: Regex,
}

impl OutputParser {
    /// Compile the console patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            player_list: Regex::new(
                r"There are (?P<online>\d+) of a max(?: of)? (?P<max>\d+) players online:\s*(?P<names>.*)$",
            )?,
            chat: Regex::new(r"(?:^|\]: )<(?P<player>[^>\s]+)> (?P<message>.*)$")?,
        })
    }

    /// Pattern matching chat lines, with `player` and `message` groups.
    #[must_use]
    pub fn chat_pattern(&self) -> &Regex {
        &self.chat
    }

    /// Parse the response to `list`.
    #[must_use]
    pub fn parse_player_list(&self, line: &str) -> Option<PlayerList> {
        let caps = self.player_list.captures(line)?;
        let online = caps["online"].parse().ok()?;
        let max = caps["max"].parse().ok()?;
        let players = caps["names"]
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        Some(PlayerList {
            online,
            max,
            players,
        })
    }

    /// Parse a player chat line.
    #[must_use]
    pub fn parse_chat(&self, line: &str) -> Option<ChatMessage> {
        let caps = self.chat.captures(line)?;
        Some(ChatMessage {
            player: caps["player"].to_string(),
            message: caps["message"].to_string(),
        })
    }
}

/// Run `list` and parse the answer.
///
/// Returns `Ok(None)` when the answer is not a player list, which happens
/// whenever unrelated output arrives first.
///
/// # Errors
///
/// Returns `ServerError` if the command cannot be sent or the process exits.
pub async fn list_players(
    server: &ServerInstance,
    parser: &OutputParser,
) -> Result<Option<PlayerList>, ServerError> {
    let response = server.command("list").await?;
    let parsed = parser.parse_player_list(&response);
    if parsed.is_none() {
        tracing::debug!(%response, "Unrecognised response to list");
    }
    Ok(parsed)
}
