use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use {
    teloxide::{Bot, types::Message},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use vaultbot_channels::{
    ChannelOutbound, CommandHandler, Dispatcher, FileHandler, FileIndex, FileTransport,
    HandlerRegistry, Materializer, TextHandler,
};

use crate::{
    Error, Result, bot, config::TelegramConfig, handlers, outbound::TelegramOutbound,
    transport::TelegramTransport,
};

/// Where materialized attachments are stored.
#[derive(Clone)]
pub struct VaultTarget {
    /// Vault root directory.
    pub root: PathBuf,
    /// Subdirectory of `root` receiving downloads.
    pub download_dir: String,
    /// Index resolving vault-relative paths.
    pub index: Arc<dyn FileIndex>,
}

struct Polling {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Telegram channel session.
///
/// Owns the handler registry shared by every consumer and the dispatcher
/// processing inbound messages. Consumers register through
/// [`add_command_handler`](Self::add_command_handler),
/// [`add_text_handler`](Self::add_text_handler) and
/// [`add_file_handler`](Self::add_file_handler), at any time.
pub struct TelegramAdapter {
    config: TelegramConfig,
    bot: Bot,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    polling: Mutex<Option<Polling>>,
}

impl TelegramAdapter {
    pub fn new(config: TelegramConfig, vault: VaultTarget) -> Result<Self> {
        if !config.has_token() {
            return Err(Error::message("telegram bot token is required"));
        }
        let bot = bot::build_bot(&config)?;
        Ok(Self::with_bot(config, bot, vault))
    }

    /// Build an adapter around an existing bot client.
    pub fn with_bot(config: TelegramConfig, bot: Bot, vault: VaultTarget) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let outbound: Arc<dyn ChannelOutbound> = Arc::new(TelegramOutbound::new(bot.clone()));
        let transport: Arc<dyn FileTransport> = Arc::new(TelegramTransport::new(bot.clone()));
        let materializer = Arc::new(Materializer::new(
            vault.root,
            vault.download_dir,
            transport,
            vault.index,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            outbound,
            materializer,
            config.chat_id.clone(),
        ));
        Self {
            config,
            bot,
            registry,
            dispatcher,
            polling: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn add_command_handler(
        &self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
        owner: impl Into<String>,
    ) {
        self.registry.add_command_handler(command, handler, owner);
    }

    pub fn add_text_handler(&self, handler: Arc<dyn TextHandler>, owner: impl Into<String>) {
        self.registry.add_text_handler(handler, owner);
    }

    /// Register a file handler; `None` listens to every file.
    pub fn add_file_handler(
        &self,
        handler: Arc<dyn FileHandler>,
        owner: impl Into<String>,
        mime_type: Option<&str>,
    ) {
        self.registry.add_file_handler(handler, owner, mime_type);
    }

    /// Send an unlabelled message to the authorized chat.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        Ok(self.dispatcher.send_message(text).await?)
    }

    /// Replace the authorized chat.
    pub fn set_authorized_chat(&self, chat_id: impl Into<String>) {
        self.dispatcher.set_authorized_chat(chat_id);
    }

    /// Process one Telegram message in the current task.
    pub async fn handle_message(&self, msg: &Message) {
        if let Some(event) = handlers::inbound_event(msg) {
            self.dispatcher.handle(event).await;
        }
    }

    pub fn is_running(&self) -> bool {
        let polling = self.polling.lock().unwrap_or_else(|e| e.into_inner());
        polling
            .as_ref()
            .is_some_and(|p| !p.cancel.is_cancelled() && !p.task.is_finished())
    }

    /// Publish commands and start long polling. No-op when already running.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            warn!("telegram adapter already running");
            return Ok(());
        }
        if self.dispatcher.authorized_chat().trim().is_empty() {
            warn!("no authorized chat configured, every message will be dropped");
        }

        bot::publish_commands(&self.bot, &self.registry.command_names()).await;

        let cancel = CancellationToken::new();
        let task = bot::start_polling(
            self.bot.clone(),
            Arc::clone(&self.dispatcher),
            self.config.poll_timeout_secs,
            cancel.clone(),
        )
        .await?;

        let previous = self
            .polling
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Polling { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        Ok(())
    }

    /// Stop polling and wait for the loop to exit. Events already being
    /// processed run to completion on their own tasks.
    pub async fn stop(&self) {
        let polling = self
            .polling
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(polling) = polling else {
            return;
        };
        info!("stopping telegram adapter");
        polling.cancel.cancel();
        if let Err(e) = polling.task.await {
            warn!(error = %e, "telegram polling task ended abnormally");
        }
    }
}
