use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{env_subst::substitute_env, schema::VaultbotConfig};

/// Standard config file names, checked in order.
pub(crate) const CONFIG_FILENAMES: &[&str] = &[
    "vaultbot.toml",
    "vaultbot.yaml",
    "vaultbot.yml",
    "vaultbot.json",
];

const APP_NAME: &str = "vaultbot";

/// A parsed config and the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: VaultbotConfig,
    pub path: PathBuf,
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<VaultbotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load `explicit` if given, otherwise the first config found in the
/// standard locations.
///
/// Search order:
/// 1. `./vaultbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/vaultbot/vaultbot.{toml,yaml,yml,json}` (user-global)
pub fn load(explicit: Option<&Path>) -> anyhow::Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file().ok_or_else(|| {
            anyhow::anyhow!(
                "no config file found; create ./vaultbot.toml or pass --config <path>"
            )
        })?,
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok(LoadedConfig { config, path })
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/vaultbot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Format of a config file, by extension. Unknown extensions read as TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    pub(crate) fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("toml") {
            "yaml" | "yml" => Self::Yaml,
            "json" => Self::Json,
            _ => Self::Toml,
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<VaultbotConfig> {
    let config = match Format::of(path) {
        Format::Toml => toml::from_str(raw)?,
        Format::Yaml => serde_yaml::from_str(raw)?,
        Format::Json => serde_json::from_str(raw)?,
    };
    Ok(config)
}

/// Parse into a generic tree, for schema checks.
pub(crate) fn parse_value(raw: &str, format: Format) -> anyhow::Result<serde_json::Value> {
    let value = match format {
        Format::Toml => {
            let v: toml::Value = toml::from_str(raw)?;
            serde_json::to_value(v)?
        },
        Format::Yaml => serde_yaml::from_str(raw)?,
        Format::Json => serde_json::from_str(raw)?,
    };
    Ok(value)
}
