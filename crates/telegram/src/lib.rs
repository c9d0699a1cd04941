//! Telegram binding of the vaultbot dispatch core.
//!
//! Converts Bot API updates into channel events, sends replies as
//! `MarkdownV2`, downloads attachments through `getFile` and runs the
//! long-polling loop.

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod outbound;
pub mod plugin;
pub mod transport;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod testing;

pub use {
    config::TelegramConfig,
    error::{Error, Result},
    plugin::{TelegramAdapter, VaultTarget},
};
