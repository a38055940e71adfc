//! Transport-facing types: typed inbound events and the outbound seam.
//!
//! The conversation engine never talks to the Bot API directly: it
//! receives [`Inbound`] events from the listener and replies through the
//! [`Outbound`] trait, so tests can drive whole flows with a recording
//! mock instead of a network.

use std::path::Path;

use async_trait::async_trait;

/// A single inline keyboard button.
#[derive(Debug, Clone)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Slash commands the bot understands.
///
/// Unknown commands are not represented here; the listener folds them
/// into plain text so receiving states re-prompt instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start` (and `/help`): reset to the action menu.
    Start,
    /// `/done`: finalize the image-collection flow.
    Done,
    /// `/cancel`: abort whatever flow is in progress.
    Cancel,
}

impl BotCommand {
    /// Parse the command token of a message text (`/done@SomeBot args`).
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?.split('@').next()?;
        match name {
            "start" | "help" => Some(Self::Start),
            "done" => Some(Self::Done),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// What an inbound event carries, beyond its chat.
#[derive(Debug, Clone)]
pub enum InboundKind {
    /// A recognized slash command.
    Command(BotCommand),
    /// An inline button press.
    Callback {
        callback_id: String,
        message_id: i64,
        data: String,
    },
    /// A photo message, already downloaded (largest available size).
    Photo { bytes: Vec<u8> },
    /// A document message, already downloaded.
    Document { bytes: Vec<u8>, file_name: String },
    /// Plain text (including unknown slash commands).
    Text,
    /// Anything else (stickers, voice, video, ...).
    Unsupported,
}

/// One event delivered from the transport to the conversation engine.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Unique id for tracing.
    pub id: String,
    /// Chat the event originated from; sessions are keyed by this.
    pub chat_id: i64,
    /// Sender's first name, when the transport provides one.
    pub first_name: Option<String>,
    /// Sender's username, when the transport provides one.
    pub username: Option<String>,
    pub kind: InboundKind,
}

impl Inbound {
    /// Build an event with a fresh id and no sender metadata.
    pub fn new(chat_id: i64, kind: InboundKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id,
            first_name: None,
            username: None,
            kind,
        }
    }
}

/// Everything the conversation engine needs from the messaging transport.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    /// Send a text message with inline keyboard buttons; returns the
    /// message id so the menu can be edited in place later.
    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<i64>;

    /// Replace an existing message's text, dropping its keyboard.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> anyhow::Result<()>;

    /// Replace an existing message's text and keyboard.
    async fn edit_menu(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<()>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;

    /// Send a file from disk as a document, with an optional caption.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parsing() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/done"), Some(BotCommand::Done));
        assert_eq!(BotCommand::parse("/cancel"), Some(BotCommand::Cancel));
    }

    #[test]
    fn command_parsing_with_bot_suffix_and_args() {
        assert_eq!(BotCommand::parse("/done@PaperPressBot"), Some(BotCommand::Done));
        assert_eq!(BotCommand::parse("/cancel please"), Some(BotCommand::Cancel));
    }

    #[test]
    fn non_commands_do_not_parse() {
        assert_eq!(BotCommand::parse("hello"), None);
        assert_eq!(BotCommand::parse("/frobnicate"), None);
        assert_eq!(BotCommand::parse(""), None);
        assert_eq!(BotCommand::parse("done"), None);
    }

    #[test]
    fn inbound_ids_are_unique() {
        let a = Inbound::new(1, InboundKind::Text);
        let b = Inbound::new(1, InboundKind::Text);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn inline_button_creation() {
        let btn = InlineButton::new("📄 Convert", "convert");
        assert_eq!(btn.text, "📄 Convert");
        assert_eq!(btn.callback_data, "convert");
    }
}
