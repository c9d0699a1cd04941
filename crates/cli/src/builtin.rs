//! Consumers shipped with the binary.
//!
//! They register through the adapter like any external consumer would and
//! step aside when an earlier handler already claimed the event.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    async_trait::async_trait,
    tokio::io::AsyncWriteExt,
    tracing::debug,
};

use {
    vaultbot_channels::{
        CommandHandler, FileHandle, FileHandler, FileKey, HandlerRegistry, HandlerResult,
        TextHandler,
    },
    vaultbot_telegram::TelegramAdapter,
};

/// Owner label of the built-in consumers.
pub const OWNER: &str = "vaultbot";

const INBOX_FILE: &str = "Inbox.md";

/// Register the built-in consumers on `adapter`.
pub fn register(adapter: &TelegramAdapter, root: &Path, download_dir: &str) {
    adapter.add_command_handler(
        "status",
        Arc::new(StatusCommand::new(Arc::clone(adapter.registry()))),
        OWNER,
    );
    adapter.add_text_handler(Arc::new(InboxText::new(root.join(download_dir))), OWNER);
    adapter.add_file_handler(Arc::new(FileAck), OWNER, None);
    debug!("built-in consumers registered");
}

/// `/status`: lists registered commands and chain sizes.
pub struct StatusCommand {
    registry: Arc<HandlerRegistry>,
}

impl StatusCommand {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    fn summary(&self) -> String {
        let commands = self.registry.command_names();
        let mut out = String::new();
        if commands.is_empty() {
            out.push_str("Commands: none\n");
        } else {
            let list: Vec<String> = commands.iter().map(|c| format!("/{c}")).collect();
            let _ = writeln!(out, "Commands: {}", list.join(", "));
        }
        let _ = writeln!(out, "Text handlers: {}", self.registry.text_handler_count());

        let files: Vec<String> = self
            .registry
            .file_chain_sizes()
            .into_iter()
            .map(|(key, size)| match key {
                FileKey::Any => format!("any ({size})"),
                FileKey::Mime(mime) => format!("{mime} ({size})"),
            })
            .collect();
        if files.is_empty() {
            out.push_str("File handlers: none");
        } else {
            let _ = write!(out, "File handlers: {}", files.join(", "));
        }
        out
    }
}

#[async_trait]
impl CommandHandler for StatusCommand {
    async fn handle(&self, _processed_before: bool) -> anyhow::Result<HandlerResult> {
        Ok(HandlerResult::answered(self.summary()))
    }
}

/// Appends unclaimed text messages to `Inbox.md` in the download directory.
pub struct InboxText {
    dir: PathBuf,
}

impl InboxText {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn inbox_path(&self) -> PathBuf {
        self.dir.join(INBOX_FILE)
    }
}

#[async_trait]
impl TextHandler for InboxText {
    async fn handle(&self, text: &str, processed_before: bool) -> anyhow::Result<HandlerResult> {
        if processed_before {
            return Ok(HandlerResult::skipped());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.inbox_path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;

        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
        let entry = format!("- {stamp} {}\n", text.trim().replace('\n', "\n  "));
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;

        Ok(HandlerResult::answered(format!("Saved to {INBOX_FILE}")))
    }
}

/// Acknowledges where an unclaimed file was saved.
pub struct FileAck;

#[async_trait]
impl FileHandler for FileAck {
    async fn handle(
        &self,
        file: &FileHandle,
        processed_before: bool,
        _caption: Option<&str>,
    ) -> anyhow::Result<HandlerResult> {
        if processed_before {
            return Ok(HandlerResult::skipped());
        }
        Ok(HandlerResult::answered(format!("Saved {}", file.path)))
    }
}
