use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use intake_desk::bot::IntakeBot;
use intake_desk::channels::{ChannelManager, CliChannel, TelegramChannel};
use intake_desk::codec::FieldCodec;
use intake_desk::commands::CommandRegistry;
use intake_desk::config::IntakeConfig;
use intake_desk::export::{self, ExportFormat, ExportJob};
use intake_desk::intake::{self, IntakeManager, SessionStore};
use intake_desk::store::{LibSqlBackend, RecordStore};

/// How often the idle-session sweep runs when a TTL is configured.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IntakeConfig::from_env().context("loading configuration")?;

    // Initialize tracing; keep the guard alive so file logs are flushed.
    let _log_guard = init_tracing(&config);

    eprintln!("📋 Intake Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());

    if !config.has_channel() {
        anyhow::bail!("no channel enabled: set TELEGRAM_BOT_TOKEN or INTAKE_CLI=true");
    }

    let codec = FieldCodec::from_base64_key(&config.encryption_key)
        .context("INTAKE_ENCRYPTION_KEY is not a valid key")?;

    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path, codec.clone())
            .await
            .context("opening database")?,
    );
    let store: Arc<dyn RecordStore> = store;

    let sessions = SessionStore::new(config.session_ttl);
    let expiry_handle = config.session_ttl.map(|ttl| {
        tracing::info!(ttl_secs = ttl.as_secs(), "Idle sessions expire");
        intake::spawn_expiry_task(Arc::clone(&sessions), SESSION_SWEEP_INTERVAL.min(ttl))
    });

    let export_handle = match &config.export {
        Some(export_config) => {
            eprintln!("   Export: {} ({})", export_config.dir.display(), export_config.cron);
            let job = ExportJob {
                store: Arc::clone(&store),
                codec: codec.clone(),
                dir: export_config.dir.clone(),
                format: ExportFormat::Html,
                decrypt: export_config.decrypt,
            };
            Some(export::spawn_export_schedule(job, &export_config.cron)?)
        }
        None => None,
    };

    let channels = Arc::new(ChannelManager::new());
    if let Some(telegram) = &config.telegram {
        let channel = TelegramChannel::new(telegram.bot_token.clone(), telegram.allowed_users.clone());
        channels.add(Arc::new(channel)).await;
        eprintln!("   Telegram: enabled");
    }
    if config.cli_enabled {
        channels.add(Arc::new(CliChannel::new())).await;
        eprintln!("   CLI: enabled");
    }
    for (name, e) in channels.health_check_all().await {
        tracing::warn!(channel = %name, "Health check failed: {}", e);
    }

    let intake = Arc::new(IntakeManager::new(Arc::clone(&store), sessions));
    let bot = IntakeBot::new(channels, CommandRegistry::standard(), intake);
    bot.run().await?;

    if let Some(handle) = expiry_handle {
        handle.abort();
    }
    if let Some(handle) = export_handle {
        handle.abort();
    }

    Ok(())
}

fn init_tracing(config: &IntakeConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
