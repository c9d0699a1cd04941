use async_trait::async_trait;

use crate::{Result, mime::Attachment};

/// Leading marker that turns a text message into a command.
pub const COMMAND_MARKER: char = '/';

/// An inbound chat event, already stripped of provider specifics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Conversation the event originates from.
    pub chat_id: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `/<name>`; the whole post-marker text is the command name.
    Command { name: String },
    /// Any other text message.
    Text { text: String },
    /// A message carrying a payload instead of text. `attachment` is `None`
    /// when the payload kind is not a downloadable file.
    File {
        attachment: Option<Attachment>,
        caption: Option<String>,
    },
}

impl EventKind {
    /// Classify a text message as command or free text.
    pub fn from_text(text: &str) -> Self {
        match text.strip_prefix(COMMAND_MARKER) {
            Some(name) => Self::Command {
                name: name.to_string(),
            },
            None => Self::Text {
                text: text.to_string(),
            },
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text { .. } => "text",
            Self::File { .. } => "file",
        }
    }
}

/// Sends replies back through the messaging channel.
///
/// Implementations own the outbound markup dialect: text passed here is raw
/// and must be escaped exactly once on the way out.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Send an unlabelled message.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Send a handler's answer attributed to its owner.
    async fn send_reply(&self, to: &str, owner: &str, answer: &str) -> Result<()>;
}
