//! Channel-agnostic dispatch core.
//!
//! Inbound chat events (commands, free text, file attachments) coming from a
//! single messaging channel are gated to one authorized conversation, routed
//! through ordered handler chains registered by independent consumers, and
//! answered with one reply per handler that produced one. File attachments are
//! materialized into the local vault before their handlers run.

pub mod dispatch;
pub mod error;
pub mod gating;
pub mod handler;
pub mod materialize;
pub mod mime;
pub mod plugin;
pub mod registry;
pub mod store;

pub use {
    dispatch::{Dispatcher, INTERNAL_ERROR_REPLY},
    error::{Error, Result},
    handler::{CommandHandler, FileHandler, HandlerEntry, HandlerResult, TextHandler},
    materialize::{FileTransport, Materializer, RemoteFile},
    mime::Attachment,
    plugin::{ChannelOutbound, EventKind, InboundEvent},
    registry::{FileKey, HandlerRegistry},
    store::{FileHandle, FileIndex, LocalFileIndex},
};
