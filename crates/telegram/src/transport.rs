use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    teloxide::{net::Download, prelude::*},
    tokio::io::AsyncWriteExt,
    tracing::debug,
};

use vaultbot_channels::{Error as ChannelError, FileTransport, RemoteFile, Result as ChannelResult};

/// Fetches attachments through the Bot API `getFile` endpoint.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileTransport for TelegramTransport {
    async fn resolve(&self, file_id: &str) -> ChannelResult<RemoteFile> {
        let file = self
            .bot
            .get_file(file_id)
            .await
            .map_err(|e| ChannelError::transport("telegram getFile", e))?;
        debug!(file_id, path = %file.path, "resolved telegram file");
        Ok(RemoteFile {
            id: file_id.to_string(),
            path: file.path,
        })
    }

    async fn download(&self, remote: &RemoteFile, destination: &Path) -> ChannelResult<PathBuf> {
        let mut dst = tokio::fs::File::create(destination).await?;
        self.bot
            .download_file(&remote.path, &mut dst)
            .await
            .map_err(|e| ChannelError::transport("telegram file download", e))?;
        dst.flush().await?;
        Ok(destination.to_path_buf())
    }
}
