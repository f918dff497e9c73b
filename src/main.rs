//! govrelay: announce new Cardano governance proposals on Telegram.
//!
//! Meant to be invoked periodically by an external scheduler (cron, systemd
//! timer). Each invocation performs exactly one fetch run and exits 0 unless
//! the configuration is unusable.
//!
//! Usage:
//!   govrelay                          # uses ./govrelay.toml if present, else env
//!   govrelay --config /etc/govrelay.toml
//!   govrelay --dry-run                # log messages instead of sending them

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use govrelay::config::{Config, LoggingConfig};
use govrelay::notifier::{LogSink, MessageSink, NotifyOptions, TelegramClient};
use govrelay::pipeline;
use govrelay::proposals::ProposalFetcher;
use govrelay::store::StateStore;

const DEFAULT_CONFIG_PATH: &str = "govrelay.toml";

const USAGE: &str = "usage: govrelay [--config <path>] [--dry-run]";

struct Args {
    config_path: Option<PathBuf>,
    dry_run: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        config_path: None,
        dry_run: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => args.config_path = Some(PathBuf::from(path)),
                None => bail!("--config needs a path\n{}", USAGE),
            },
            "--dry-run" => args.dry_run = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other => bail!("unknown argument: {}\n{}", other, USAGE),
        }
    }
    Ok(Some(args))
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => Config::from_env(),
    };
    Ok(config)
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if config.json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
        None if config.json => builder.json().init(),
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config = load_config(args.config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("govrelay v{} starting", env!("CARGO_PKG_VERSION"));

    let fetcher = ProposalFetcher::new(config.api.url.clone(), config.api.timeout())?;
    let store = StateStore::new(config.state.path.clone());

    let sink: Box<dyn MessageSink> = if args.dry_run {
        info!("dry run: messages are logged, state is not saved");
        Box::new(LogSink)
    } else {
        config.validate()?;
        Box::new(TelegramClient::new(
            config.telegram.api_url.clone(),
            config.telegram.bot_token.clone(),
            config.telegram.chat_id.clone(),
            config.telegram.timeout(),
        )?)
    };

    let opts = NotifyOptions {
        mark_failed_as_notified: config.delivery.mark_failed_as_notified,
        persist: !args.dry_run,
    };

    let report = pipeline::run_once(&store, &fetcher, sink.as_ref(), opts).await;
    info!(
        state = %store.path().display(),
        summary = %report,
        "run complete"
    );

    Ok(())
}
