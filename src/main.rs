use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tg_media_bot::bot::gateway::TelegramGateway;
use tg_media_bot::bot::router::CommandRouter;
use tg_media_bot::bot::{self, BotState};
use tg_media_bot::config::BotConfig;
use tg_media_bot::infrastructure::{storage, telegram, tools};
use tg_media_bot::services::cleanup::CleanupService;
use tg_media_bot::services::orchestrator::JobOrchestrator;
use tg_media_bot::services::sessions::Sessions;
use tg_media_bot::services::worker::BackgroundWorker;
use tg_media_bot::utils::keyed_mutex::KeyedMutex;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (bot, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Overrides STORAGE_DIR
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Overrides TEMP_DIR
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tg_media_bot=info,teloxide=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !matches!(args.mode.as_str(), "bot" | "worker" | "all") {
        anyhow::bail!("unknown mode {:?}, expected bot, worker or all", args.mode);
    }

    info!("🚀 Starting Telegram Media Bot [Mode: {}]...", args.mode);

    let mut config = BotConfig::from_env();
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(dir) = args.temp_dir {
        config.temp_dir = dir;
    }
    info!(
        "🛡️  Limits: upload={}MB, delivery={}MB, jobs={}, secure passes={}",
        config.max_file_size / 1024 / 1024,
        config.delivery_limit / 1024 / 1024,
        config.max_concurrent_jobs,
        config.secure_delete_passes
    );

    // 2. Setup Common Infrastructure
    let locks = KeyedMutex::new();
    let sessions = Sessions::new();
    let storage_service = storage::setup_storage(&config, locks.clone()).await?;

    // 3. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Initialize Worker Service
    if args.mode == "worker" || args.mode == "all" {
        let worker = BackgroundWorker::new(
            &config,
            CleanupService::from_config(&config),
            sessions.clone(),
            locks.clone(),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
        info!("👷 Worker service initialized.");
    }

    // 5. Initialize Bot Service
    let mut bot_shutdown = None;
    let mut orchestrator_handle = None;
    if args.mode == "bot" || args.mode == "all" {
        let tg = telegram::setup_bot(&config)?;
        let toolchain = tools::setup_toolchain(&config).await;

        let orchestrator = Arc::new(JobOrchestrator::new(
            &config,
            storage_service.clone(),
            toolchain.converter,
            toolchain.metadata_reader,
            toolchain.downloader.clone(),
            CleanupService::from_config(&config),
        ));

        let state = BotState {
            config: Arc::new(config.clone()),
            orchestrator: orchestrator.clone(),
            router: Arc::new(CommandRouter::new(&config, storage_service.clone())),
            sessions: sessions.clone(),
            downloader: toolchain.downloader,
            gateway: Arc::new(TelegramGateway::new(tg.clone(), config.use_local_api)),
        };

        let mut dispatcher = Dispatcher::builder(tg, bot::schema())
            .dependencies(dptree::deps![state])
            .default_handler(|upd| async move {
                tracing::debug!("Unhandled update: {:?}", upd.id);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "❌ An error has occurred in the dispatcher",
            ))
            .build();

        bot_shutdown = Some(dispatcher.shutdown_token());
        orchestrator_handle = Some(orchestrator);

        handles.push(tokio::spawn(async move {
            dispatcher.dispatch().await;
        }));
        info!("🤖 Bot is polling for updates.");
    }

    // 6. Wait for Shutdown Signal
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down services...");

    if let Some(orchestrator) = orchestrator_handle {
        orchestrator.shutdown();
    }
    if let Some(token) = bot_shutdown {
        match token.shutdown() {
            Ok(done) => done.await,
            Err(_) => info!("Dispatcher was idle"),
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("❌ Task ended abnormally: {}", e);
        }
    }

    info!("👋 Bot exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
