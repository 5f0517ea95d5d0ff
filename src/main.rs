use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use category_tree::app::{App, AppEvent};
use category_tree::catalog::{
    CategoryRepository, HttpCategoryRepository, HttpSettings, InMemoryCategoryRepository,
};
use category_tree::config::{Config, TOKEN_ENV_VAR};
use category_tree::ui;

/// Artificial latency of the demo catalog, so the loading spinner is visible.
const DEMO_LATENCY: Duration = Duration::from_millis(400);

/// Get the config directory path (~/.config/category-tree/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("category-tree"))
}

#[derive(Parser, Debug)]
#[command(
    name = "category-tree",
    about = "Browse and edit a storefront category tree from the terminal"
)]
struct Args {
    /// Config file (default: ~/.config/category-tree/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the API base URL from the config file
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Use a built-in sample catalog instead of the API
    #[arg(long)]
    demo: bool,

    /// Log file (default: ~/.config/category-tree/category-tree.log)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Route tracing output to a file; the terminal belongs to the TUI.
fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file '{}'", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;
    Ok(())
}

fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    }

    // User-only access: the config file may hold an API token.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

fn build_repository(args: &Args, config: &Config) -> Result<Arc<dyn CategoryRepository>> {
    if args.demo {
        tracing::info!("Using demo catalog");
        return Ok(Arc::new(
            InMemoryCategoryRepository::demo().with_latency(DEMO_LATENCY),
        ));
    }

    let settings = HttpSettings {
        base_url: config.api_base_url.clone(),
        token: config.api_token.clone().map(SecretString::from),
        timeout: config.request_timeout(),
        max_retries: config.max_retries,
        retry_backoff: config.retry_backoff(),
    };
    let repo = HttpCategoryRepository::new(settings)
        .with_context(|| format!("Invalid API base URL '{}'", config.api_base_url))?;
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| config_dir.join("category-tree.log"));
    init_logging(&log_path)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    config.apply_env_token(std::env::var(TOKEN_ENV_VAR).ok());
    if let Some(base_url) = &args.base_url {
        config.api_base_url = base_url.clone();
    }

    let repo = build_repository(&args, &config)?;
    let mut app = App::new(repo, &config);

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(32);
    ui::run(&mut app, event_tx, event_rx).await?;

    println!("Goodbye!");
    Ok(())
}
