use clap::Parser;
use ctg_monitor::{
    build_router,
    classifier::{Classifier, HttpClassifier, StaticRecommendations},
    cli::{Cli, Commands},
    config::ServerConfig,
    cors_layer,
    state::ServerState,
    storage::{MemorySessionStore, PostgresSessionStore, SessionStore},
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ctg_monitor=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Detect(args)) => return args.execute(),
        Some(Commands::Serve) | None => {}
    }

    let config = ServerConfig::from_env()?;

    info!("🚀 Starting CTG Monitor v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Window: {}s", config.window_seconds);
    info!("   Broadcast interval: {}ms", config.broadcast_interval_ms);
    info!("   Persist interval: {}s", config.persist_interval_secs);
    info!("   Classifier interval: {}s", config.external_flush_secs);
    info!("   BPM port: {}", config.bpm_port.as_deref().unwrap_or("-"));
    info!("   Uterus port: {}", config.uterus_port.as_deref().unwrap_or("-"));
    info!(
        "   Emulator: {}",
        config.emulator_command.as_deref().unwrap_or("disabled")
    );

    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await?;
            let store = PostgresSessionStore::new(pool);
            store.initialize().await?;
            info!("✅ Database connected and schema initialized");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, sessions are kept in memory only");
            Arc::new(MemorySessionStore::new())
        }
    };

    let classifier: Option<Arc<dyn Classifier>> = match &config.classifier_url {
        Some(url) => {
            let client =
                HttpClassifier::new(url.clone(), Duration::from_secs(config.classifier_timeout_secs))?;
            info!("🧠 Classifier endpoint: {}", client.url());
            Some(Arc::new(client))
        }
        None => {
            warn!("CLASSIFIER_URL not set, classifier calls are skipped");
            None
        }
    };

    let state = Arc::new(ServerState::new(
        config.clone(),
        store,
        classifier,
        Arc::new(StaticRecommendations::new()),
    ));

    info!("   CORS origins: {:?}", config.cors_origins);
    let app = build_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("📡 WebSocket endpoint: ws://{}/ws", addr);
    info!("🔑 Health endpoint: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match state.sessions.stop().await {
        Ok(Some(id)) => info!("Stopped session {} on shutdown", id),
        Ok(None) => {}
        Err(e) => error!("Failed to stop session on shutdown: {}", e),
    }
    info!("👋 Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
