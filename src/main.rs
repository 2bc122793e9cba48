use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedrelay::config::{default_config_path, Config, ConfigError};
use feedrelay::language::Language;
use feedrelay::ops::{self, OpsError, ResendRequest};
use feedrelay::service;
use feedrelay::storage::{Database, DatabaseError, Store};

#[derive(Parser, Debug)]
#[command(
    name = "feedrelay",
    version,
    about = "Relays new Pixivision articles to subscribed chat channels"
)]
struct Args {
    /// Config file (default: $FEEDRELAY_CONFIG or ~/.config/feedrelay/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feeds and deliver new articles until interrupted
    Run,

    /// Route languages of a guild to a channel
    Configure {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        channel: String,
        /// Comma-separated codes (zh-tw, ja, en) or "all"
        #[arg(long, default_value = "all")]
        languages: String,
    },

    /// Remove a guild's subscription for one language, or for all of them
    Unconfigure {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        language: Option<String>,
    },

    /// Send the most recent articles to a channel regardless of history
    Resend {
        #[arg(long)]
        channel: String,
        /// A language code or "all"
        #[arg(long, default_value = "all")]
        language: String,
        /// Articles per language (default: everything in the feed)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },

    /// Show a guild's subscriptions and delivery count
    Status {
        #[arg(long)]
        guild: String,
    },

    /// List every configured destination
    List,

    /// Delete delivery records older than the retention period
    Purge {
        /// Override the configured retention in days
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        days: Option<u64>,
    },
}

/// SEC-007: Restrict the data directory to the current user (Unix only).
fn prepare_data_dir(db_path: &Path) -> Result<()> {
    let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to set data directory permissions to 0700"
                );
            }
        }
    }
    Ok(())
}

async fn open_store_or_exit(config: &Config) -> Result<Database> {
    prepare_data_dir(&config.database_path)?;
    match service::open_store(config).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The database at {} is locked by another process. Please stop it and try again.",
                config.database_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Prints an operator-facing failure and exits.
fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {e}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let config = match Config::from_env(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(e),
    };
    tracing::debug!(config = ?config, "Configuration resolved");

    match args.command {
        Command::Run => {
            prepare_data_dir(&config.database_path)?;
            let shutdown = async {
                if let Err(e) = service::shutdown_signal().await {
                    tracing::error!(error = %e, "Signal handling failed, shutting down");
                }
            };
            match service::run(&config, shutdown).await {
                Ok(()) => {}
                Err(service::ServiceError::Config(e @ ConfigError::Missing(_))) => fail(e),
                Err(service::ServiceError::Database(DatabaseError::InstanceLocked)) => {
                    fail(DatabaseError::InstanceLocked)
                }
                Err(e) => return Err(e).context("Relay service failed"),
            }
        }

        Command::Configure {
            guild,
            channel,
            languages,
        } => {
            let languages = ops::parse_languages(&languages).unwrap_or_else(|e| fail(e));
            let db = open_store_or_exit(&config).await?;
            let report = ops::configure(&db, &guild, &channel, &languages)
                .await
                .unwrap_or_else(|e| fail(e));
            println!(
                "Configured guild {} → channel {} for: {}",
                report.guild_id,
                report.channel_id,
                report.language_names()
            );
        }

        Command::Unconfigure { guild, language } => {
            let language = language
                .map(|code| code.parse::<Language>())
                .transpose()
                .unwrap_or_else(|e| fail(e));
            let db = open_store_or_exit(&config).await?;
            let removed = ops::unconfigure(&db, &guild, language)
                .await
                .unwrap_or_else(|e| fail(e));
            if removed == 0 {
                println!("Guild {} had no matching subscription", guild);
            } else {
                println!("Removed {} subscription(s) for guild {}", removed, guild);
            }
        }

        Command::Resend {
            channel,
            language,
            count,
        } => {
            let languages = ops::parse_languages(&language).unwrap_or_else(|e| fail(e));
            let db = open_store_or_exit(&config).await?;
            let client = service::http_client(&config).context("Failed to build HTTP client")?;
            let store: Arc<dyn Store> = Arc::new(db);
            let engine =
                service::delivery_engine(&config, store, client.clone()).unwrap_or_else(|e| fail(e));

            let request = ResendRequest {
                channel_id: channel,
                languages,
                count: count.map(|c| usize::try_from(c).unwrap_or(usize::MAX)),
            };
            match ops::resend(
                &engine,
                &client,
                &config.feed_sources(),
                &config.fetch_options(),
                &request,
            )
            .await
            {
                Ok(report) => println!(
                    "Resent {} of {} article(s) to channel {}",
                    report.sent, report.articles, request.channel_id
                ),
                Err(e @ OpsError::NoArticles) => {
                    fail(format!("{e}. The feeds may be unreachable, check the logs."))
                }
                Err(e) => fail(e),
            }
        }

        Command::Status { guild } => {
            let db = open_store_or_exit(&config).await?;
            let status = ops::status(&db, &guild).await.unwrap_or_else(|e| fail(e));
            if !status.is_configured() {
                println!("Guild {} is not configured", guild);
            }
            for dest in &status.destinations {
                println!(
                    "{} {:<8} → channel {}",
                    dest.language.badge(),
                    dest.language.display_name(),
                    dest.channel_id
                );
            }
            println!("Articles delivered: {}", status.deliveries);
            for record in &status.recent {
                let when = chrono::DateTime::from_timestamp(record.posted_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {} [{}] {}", when, record.language, record.article_url);
            }
        }

        Command::List => {
            let db = open_store_or_exit(&config).await?;
            let destinations = ops::list_destinations(&db)
                .await
                .unwrap_or_else(|e| fail(e));
            if destinations.is_empty() {
                println!("No destinations configured");
            }
            for dest in &destinations {
                println!(
                    "guild {} {:<6} → channel {}",
                    dest.guild_id, dest.language, dest.channel_id
                );
            }
        }

        Command::Purge { days } => {
            let retention = match days {
                Some(days) => std::time::Duration::from_secs(days.saturating_mul(24 * 60 * 60)),
                None => config.retention(),
            };
            let db = open_store_or_exit(&config).await?;
            let deleted = ops::purge(&db, retention).await.unwrap_or_else(|e| fail(e));
            println!("Deleted {} delivery record(s)", deleted);
        }
    }

    Ok(())
}
