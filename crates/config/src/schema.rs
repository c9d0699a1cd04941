//! Config schema types.
//!
//! The `[telegram]` section is kept as a raw value here and parsed by the
//! telegram crate, so this crate stays independent of the bot stack.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Vault subdirectory that receives downloaded attachments.
pub const DEFAULT_DOWNLOAD_DIR: &str = "Telegram";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultbotConfig {
    pub vault: VaultConfig,
    /// Bot settings, see `vaultbot_telegram::TelegramConfig`.
    pub telegram: serde_json::Value,
    pub builtins: BuiltinsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Local notes directory. Required to run.
    pub root: Option<PathBuf>,
    /// Where attachments land, relative to `root`.
    pub download_dir: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: None,
            download_dir: DEFAULT_DOWNLOAD_DIR.into(),
        }
    }
}

impl VaultConfig {
    /// `root` with a leading `~` expanded to the home directory.
    pub fn resolved_root(&self) -> Option<PathBuf> {
        self.root.as_deref().map(expand_home)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinsConfig {
    /// Register the binary's own status, inbox and file-ack consumers.
    pub enabled: bool,
}

impl Default for BuiltinsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
