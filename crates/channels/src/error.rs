use std::error::Error as StdError;

/// Crate-wide result type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort the processing of a single inbound event.
///
/// Rejected authorization and unclassifiable attachments are not errors:
/// they end the event silently and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Operation is currently unavailable (not configured/ready).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    /// A materialized file is not (yet) known to the vault index.
    #[error("file not found in vault index: {path}")]
    Lookup { path: String },

    /// Download or send through the messaging transport failed.
    #[error("transport failure: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A registered handler returned an error.
    #[error("handler owned by {owner:?} failed: {source}")]
    Handler {
        owner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn lookup(path: impl Into<String>) -> Self {
        Self::Lookup { path: path.into() }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn handler(owner: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Handler {
            owner: owner.into(),
            source,
        }
    }
}
