mod builtin;
mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, bail},
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    vaultbot_channels::LocalFileIndex,
    vaultbot_config::{
        LoadedConfig,
        validate::{self, Severity},
    },
    vaultbot_telegram::{TelegramAdapter, TelegramConfig, VaultTarget},
};

#[derive(Parser)]
#[command(name = "vaultbot", version, about = "Telegram bridge into a local notes vault")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ./vaultbot.toml, then ~/.config/vaultbot/).
    #[arg(long, global = true, env = "VAULTBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge (default when no subcommand is provided).
    Run,
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let LoadedConfig { config, path } = vaultbot_config::load(cli.config.as_deref())?;
    info!(path = %path.display(), "config loaded");

    let validation = validate::validate(Some(&path));
    for d in &validation.diagnostics {
        match d.severity {
            Severity::Error => warn!(path = %d.path, "config error: {}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if validation.has_errors() {
        bail!(
            "{} has errors, run `vaultbot check` for details",
            path.display()
        );
    }

    let root = config
        .vault
        .resolved_root()
        .context("vault.root is not configured")?;
    if !root.is_dir() {
        bail!("vault root {} is not a directory", root.display());
    }

    let telegram = TelegramConfig::from_value(config.telegram)?;
    let vault = VaultTarget {
        root: root.clone(),
        download_dir: config.vault.download_dir.clone(),
        index: Arc::new(LocalFileIndex::new(&root)),
    };
    let adapter = TelegramAdapter::new(telegram, vault)?;

    if config.builtins.enabled {
        builtin::register(&adapter, &root, &config.vault.download_dir);
    }

    adapter.start().await?;
    info!(vault = %root.display(), "vaultbot running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    adapter.stop().await;
    info!("vaultbot stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "vaultbot starting");
            run(&cli).await
        },
        Some(Commands::Check { verbose }) => config_commands::check(cli.config.as_deref(), verbose),
    }
}
