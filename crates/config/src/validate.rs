//! Configuration validation.
//!
//! Detects syntax and type errors, unknown or misspelled fields, and settings
//! that would leave the bridge unable to run or deaf to every message.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use serde_json::Value;

use crate::{
    env_subst::{substitute_env, unresolved_placeholders},
    loader::{self, Format},
    schema::VaultbotConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "vault", "telegram" or
    /// "builtins".
    pub category: &'static str,
    /// Dotted path, e.g. "telegram.chat_id".
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "vault",
            Struct(HashMap::from([("root", Leaf), ("download_dir", Leaf)])),
        ),
        (
            "telegram",
            Struct(HashMap::from([
                ("token", Leaf),
                ("chat_id", Leaf),
                ("api_url", Leaf),
                ("poll_timeout_secs", Leaf),
            ])),
        ),
        ("builtins", Struct(HashMap::from([("enabled", Leaf)]))),
    ]))
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => {
                let message = match suggest(key, &known, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, excluding exact matches.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(c, d)| (d, c))
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate the config file at `path`, or the discovered one if `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path
        .map(Path::to_path_buf)
        .or_else(loader::find_config_file)
    else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                "no config file found",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(raw) => validate_str(&substitute_env(&raw), Format::of(&config_path)),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate config text that already had env placeholders substituted.
#[must_use]
pub(crate) fn validate_str(raw: &str, format: Format) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match loader::parse_value(raw, format) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<VaultbotConfig>(value) {
        Ok(config) => {
            check_vault(&config, &mut diagnostics);
            check_telegram(&config.telegram, &mut diagnostics);
            if !config.builtins.enabled {
                diagnostics.push(Diagnostic::new(
                    Severity::Info,
                    "builtins",
                    "builtins.enabled",
                    "built-in consumers disabled; only externally registered handlers will answer",
                ));
            }
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_vault(config: &VaultbotConfig, diagnostics: &mut Vec<Diagnostic>) {
    match config.vault.resolved_root() {
        None => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "vault",
            "vault.root",
            "vault root is required",
        )),
        Some(root) if !root.is_dir() => diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "vault",
            "vault.root",
            format!("{} is not an existing directory", root.display()),
        )),
        Some(_) => {},
    }

    let download_dir = Path::new(&config.vault.download_dir);
    let escapes = download_dir
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "vault",
            "vault.download_dir",
            "download_dir must be a relative path inside the vault",
        ));
    }
}

fn check_telegram(telegram: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let token = telegram.get("token").and_then(Value::as_str).unwrap_or("");
    if token.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.token",
            "bot token is required",
        ));
    } else if let Some(name) = unresolved_placeholders(token).first() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.token",
            format!("environment variable {name} is not set"),
        ));
    }

    let chat_id = match telegram.get("chat_id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    if chat_id.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "telegram",
            "telegram.chat_id",
            "no authorized chat configured (awaiting first contact); every event will be dropped",
        ));
    } else if chat_id.parse::<i64>().is_err() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.chat_id",
            format!("{chat_id:?} is not a numeric telegram chat id"),
        ));
    }
}
