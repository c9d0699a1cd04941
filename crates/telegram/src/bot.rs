use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use vaultbot_channels::Dispatcher;

use crate::{Error, Result, config::TelegramConfig, handlers};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Build a bot whose HTTP timeout outlasts the long-polling timeout.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    // The client must not abort the request before Telegram answers the
    // long poll.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()
        .map_err(|e| Error::message(format!("failed to build telegram http client: {e}")))?;
    let mut bot = Bot::with_client(config.token.expose_secret(), client);
    if let Some(api_url) = config.api_url.as_deref() {
        let url = reqwest::Url::parse(api_url)
            .map_err(|e| Error::message(format!("invalid telegram api_url {api_url:?}: {e}")))?;
        bot = bot.set_api_url(url);
    }
    Ok(bot)
}

/// Whether `name` can be published as a Telegram bot command.
pub fn is_publishable_command(name: &str) -> bool {
    (1..=32).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Publish the registered command names for client autocomplete.
///
/// Names Telegram would reject are skipped. Failures are logged only.
pub async fn publish_commands(bot: &Bot, names: &[String]) {
    let commands: Vec<BotCommand> = names
        .iter()
        .filter(|name| is_publishable_command(name))
        .map(|name| BotCommand::new(name.as_str(), format!("Run /{name}")))
        .collect();
    let skipped = names.len() - commands.len();
    if skipped > 0 {
        debug!(skipped, "not publishing commands with unsupported names");
    }
    if commands.is_empty() {
        return;
    }

    let count = commands.len();
    match bot.set_my_commands(commands).await {
        Ok(_) => info!(count, "published bot commands"),
        Err(e) => warn!(error = %e, "failed to register bot commands"),
    }
}

/// Start long polling.
///
/// Every message update becomes one event, processed on its own task so a
/// slow handler stalls only its own event. The loop runs until `cancel` is
/// cancelled, or until Telegram reports another instance polling with the
/// same token, in which case it cancels `cancel` itself.
pub async fn start_polling(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    // Verify credentials and get bot username.
    let me = bot.get_me().await?;

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    info!(
        username = ?me.username,
        "telegram bot connected (webhook cleared)"
    );

    let handle = tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(poll_timeout_secs)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                let Some(event) = handlers::inbound_event(&msg) else {
                                    debug!(chat_id = msg.chat.id.0, "ignoring service message");
                                    continue;
                                };
                                let dispatcher = Arc::clone(&dispatcher);
                                tokio::spawn(async move { dispatcher.handle(event).await });
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another bot instance is running with the same token.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!(
                            "telegram bot disabled: another instance is already running with this token"
                        );
                        cancel.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                    }
                },
            }
        }
        info!("telegram polling stopped");
    });

    Ok(handle)
}
