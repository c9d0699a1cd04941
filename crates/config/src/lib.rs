//! Configuration loading, env substitution and validation.
//!
//! Config files: `vaultbot.toml`, `vaultbot.yaml`, `vaultbot.yml` or
//! `vaultbot.json`, searched in `./` then the user config directory
//! (`~/.config/vaultbot/` on Linux).
//!
//! `${ENV_VAR}` placeholders are substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{LoadedConfig, config_dir, find_config_file, load, load_config},
    schema::{BuiltinsConfig, DEFAULT_DOWNLOAD_DIR, VaultConfig, VaultbotConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
