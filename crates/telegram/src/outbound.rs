use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{ChatId, ParseMode},
    },
    tracing::{debug, warn},
};

use vaultbot_channels::{ChannelOutbound, Error as ChannelError, Result as ChannelResult};

use crate::markdown::{self, TELEGRAM_MAX_MESSAGE_LEN};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Outbound message sender for Telegram.
///
/// All text goes out as `MarkdownV2`; callers pass raw text.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_messages(&self, to: &str, messages: &[String]) -> ChannelResult<()> {
        let chat_id = parse_chat_id(to)?;
        for message in messages {
            let request = || {
                let req = self
                    .bot
                    .send_message(chat_id, message.as_str())
                    .parse_mode(ParseMode::MarkdownV2);
                async move { req.await }
            };
            self.run_telegram_request_with_retry(to, "send message", request)
                .await
                .map_err(|e| ChannelError::transport("telegram sendMessage", e))?;
        }
        debug!(chat_id = to, count = messages.len(), "telegram messages sent");
        Ok(())
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        to: &str,
        operation: &'static str,
        mut request: F,
    ) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = to,
                            operation,
                            retries,
                            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id = to,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn parse_chat_id(to: &str) -> ChannelResult<ChatId> {
    to.trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| ChannelError::invalid_input(format!("not a telegram chat id: {to:?}")))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    async fn send_text(&self, to: &str, text: &str) -> ChannelResult<()> {
        if text.trim().is_empty() {
            return Err(ChannelError::invalid_input("refusing to send an empty message"));
        }
        let messages = markdown::text_messages(text, TELEGRAM_MAX_MESSAGE_LEN);
        self.send_messages(to, &messages).await
    }

    async fn send_reply(&self, to: &str, owner: &str, answer: &str) -> ChannelResult<()> {
        let messages = markdown::reply_messages(owner, answer, TELEGRAM_MAX_MESSAGE_LEN);
        self.send_messages(to, &messages).await
    }
}
