// ABOUTME: Main entry point: initializes logging and config, wires the session
// ABOUTME: controller, router, stores, and builtin modules, and handles shutdown.

use anyhow::{Context, Result};
use chirp::config::Config;
use chirp::cooldown::CooldownTracker;
use chirp::executor::Executor;
use chirp::gateway::tcp::TcpTransport;
use chirp::permissions::PermissionResolver;
use chirp::registry::Registry;
use chirp::router::Router;
use chirp::session::{SessionConfig, SessionController};
use chirp::status::StatusRotator;
use chirp::store::StoreManager;
use chirp::modules;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC! Bot crashed with the following error:");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chirp");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!(
        gateway = %config.gateway.address,
        prefix = %config.bot.prefix,
        owners = config.permissions.owners.len(),
        document_path = %config.stores.document_path,
        cache_path = %config.stores.cache_path,
        "Configuration loaded"
    );

    // One shutdown signal fans out to every background loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    // Stores come up first so everything downstream can take handles
    let stores = StoreManager::connect(&config.stores, config.backoff.clone());
    stores.spawn_health_loops(shutdown_rx.clone());

    // Registry bootstrap with the builtin module set
    let registry = Arc::new(Registry::new());
    for module in modules::builtin(Utc::now()) {
        let name = module.name.clone();
        registry
            .load(module)
            .with_context(|| format!("Failed to load builtin module '{name}'"))?;
    }

    let permissions = Arc::new(PermissionResolver::new(
        &config.permissions.owners,
        &config.permissions.admins,
        &config.permissions.moderators,
    ));
    let cooldowns = CooldownTracker::new(Arc::clone(&stores));
    let executor = Arc::new(Executor::new(
        cooldowns,
        Duration::from_secs(config.bot.handler_timeout_secs),
        Duration::from_secs(config.bot.default_cooldown_secs),
    ));

    let transport = Arc::new(TcpTransport::new(config.gateway.address.clone()));
    let session_config = SessionConfig {
        token: config.token().to_string(),
        backoff: config.backoff.clone(),
        max_reconnect_attempts: config.gateway.max_reconnect_attempts,
        hello_timeout: Duration::from_secs(config.gateway.hello_timeout_secs),
    };
    let (controller, channels) = SessionController::new(transport, session_config, shutdown_rx.clone());

    let router = Router::new(
        Arc::clone(&registry),
        executor,
        permissions,
        Arc::clone(&stores),
        channels.outbound.clone(),
        config.bot.prefix.clone(),
    );
    let router_task = tokio::spawn(router.run(channels.events));

    let rotator = StatusRotator::new(
        config.bot.statuses.clone(),
        Duration::from_secs(config.bot.status_interval_secs),
        channels.outbound.clone(),
        channels.state.clone(),
        shutdown_rx.clone(),
    );
    tokio::spawn(rotator.run());

    tracing::info!("Bot ready, connecting to gateway");

    // The session controller runs until shutdown or a fatal gateway error.
    let session_result = controller.run().await;

    // Dropping the controller closed the event channel, so the router drains
    // what is in flight and stops on its own.
    if let Err(e) = router_task.await {
        tracing::error!(error = %e, "router task failed");
    }

    // Stores close last on every exit path
    stores.shutdown().await;

    match session_result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "session ended fatally");
            Err(e.into())
        }
    }
}

/// Translate SIGINT/SIGTERM into the shutdown watch signal.
fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    let _ = shutdown_tx.send(true);
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT received, shutting down"),
                _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Ctrl-C received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });
}
