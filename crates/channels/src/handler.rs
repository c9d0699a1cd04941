use std::sync::Arc;

use async_trait::async_trait;

use crate::store::FileHandle;

/// Outcome of one handler invocation.
///
/// `processed` and `answer` are independent: a handler may answer without
/// claiming the event (an informational reply), or claim it silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerResult {
    /// The event was meaningfully handled.
    pub processed: bool,
    /// Optional reply fragment, sent attributed to the handler's owner.
    pub answer: Option<String>,
}

impl HandlerResult {
    /// Not handled, nothing to say.
    #[must_use]
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Handled, without a reply.
    #[must_use]
    pub fn processed() -> Self {
        Self {
            processed: true,
            answer: None,
        }
    }

    /// Handled, with a reply.
    #[must_use]
    pub fn answered(answer: impl Into<String>) -> Self {
        Self {
            processed: true,
            answer: Some(answer.into()),
        }
    }

    /// Not handled, but with an informational reply.
    #[must_use]
    pub fn informational(answer: impl Into<String>) -> Self {
        Self {
            processed: false,
            answer: Some(answer.into()),
        }
    }
}

/// Reacts to `/<name>` commands.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, processed_before: bool) -> anyhow::Result<HandlerResult>;
}

/// Reacts to any free-text message.
#[async_trait]
pub trait TextHandler: Send + Sync {
    async fn handle(&self, text: &str, processed_before: bool) -> anyhow::Result<HandlerResult>;
}

/// Reacts to a file that has been materialized in the vault.
#[async_trait]
pub trait FileHandler: Send + Sync {
    async fn handle(
        &self,
        file: &FileHandle,
        processed_before: bool,
        caption: Option<&str>,
    ) -> anyhow::Result<HandlerResult>;
}

/// A registered handler and the label of the consumer that registered it.
///
/// The owner is used for reply attribution only; duplicates are allowed.
pub struct HandlerEntry<H: ?Sized> {
    pub handler: Arc<H>,
    pub owner: String,
}

impl<H: ?Sized> HandlerEntry<H> {
    pub fn new(handler: Arc<H>, owner: impl Into<String>) -> Self {
        Self {
            handler,
            owner: owner.into(),
        }
    }
}

impl<H: ?Sized> Clone for HandlerEntry<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            owner: self.owner.clone(),
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for HandlerEntry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
