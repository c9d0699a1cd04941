use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::handler::{CommandHandler, FileHandler, HandlerEntry, TextHandler};

/// Ordered list of handlers registered under one dispatch key.
pub type Chain<H> = Vec<HandlerEntry<H>>;

/// Dispatch key of the file sub-registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileKey {
    /// Any file, regardless of MIME type.
    Any,
    /// Exact MIME type match.
    Mime(String),
}

impl FileKey {
    /// Build a key from an optional MIME filter; a missing or empty filter
    /// means "any file".
    pub fn from_filter(mime_type: Option<&str>) -> Self {
        match mime_type.map(str::trim) {
            None | Some("") => Self::Any,
            Some(mime) => Self::Mime(mime.to_string()),
        }
    }
}

/// Handler chains registered by the consumers of one channel session.
///
/// Registration only ever appends, so insertion order is invocation order.
/// Lookups hand out a snapshot of the chain: a dispatch in progress is never
/// affected by a concurrent registration, and the std locks are never held
/// across an `.await`.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: RwLock<HashMap<String, Chain<dyn CommandHandler>>>,
    text: RwLock<Chain<dyn TextHandler>>,
    files: RwLock<HashMap<FileKey, Chain<dyn FileHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `/<command>`. Command names are case-sensitive.
    pub fn add_command_handler(
        &self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
        owner: impl Into<String>,
    ) {
        let owner = owner.into();
        debug!(command, owner, "registering command handler");
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        commands
            .entry(command.to_string())
            .or_default()
            .push(HandlerEntry::new(handler, owner));
    }

    /// Register a handler for every free-text message.
    pub fn add_text_handler(&self, handler: Arc<dyn TextHandler>, owner: impl Into<String>) {
        let owner = owner.into();
        debug!(owner, "registering text handler");
        let mut text = self.text.write().unwrap_or_else(|e| e.into_inner());
        text.push(HandlerEntry::new(handler, owner));
    }

    /// Register a file handler. `None` (or an empty string) registers it for
    /// any file regardless of MIME type.
    pub fn add_file_handler(
        &self,
        handler: Arc<dyn FileHandler>,
        owner: impl Into<String>,
        mime_type: Option<&str>,
    ) {
        let owner = owner.into();
        let key = FileKey::from_filter(mime_type);
        debug!(owner, key = ?key, "registering file handler");
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files
            .entry(key)
            .or_default()
            .push(HandlerEntry::new(handler, owner));
    }

    /// Chain registered for `command`, or `None` if nobody registered it.
    pub fn command_chain(&self, command: &str) -> Option<Chain<dyn CommandHandler>> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        commands.get(command).cloned()
    }

    /// The text chain, or `None` if no text handler is registered.
    pub fn text_chain(&self) -> Option<Chain<dyn TextHandler>> {
        let text = self.text.read().unwrap_or_else(|e| e.into_inner());
        (!text.is_empty()).then(|| text.clone())
    }

    /// Chain registered under `key`, or `None`.
    pub fn file_chain(&self, key: &FileKey) -> Option<Chain<dyn FileHandler>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(key).cloned()
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered text handlers.
    pub fn text_handler_count(&self) -> usize {
        self.text.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// File chain sizes per key, wildcard first then MIME types sorted.
    pub fn file_chain_sizes(&self) -> Vec<(FileKey, usize)> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let mut sizes: Vec<(FileKey, usize)> = files
            .iter()
            .map(|(key, chain)| (key.clone(), chain.len()))
            .collect();
        sizes.sort_by(|(a, _), (b, _)| match (a, b) {
            (FileKey::Any, FileKey::Any) => std::cmp::Ordering::Equal,
            (FileKey::Any, _) => std::cmp::Ordering::Less,
            (_, FileKey::Any) => std::cmp::Ordering::Greater,
            (FileKey::Mime(a), FileKey::Mime(b)) => a.cmp(b),
        });
        sizes
    }
}
