use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helpdesk_core::{
    chat::create_llm_client, load_config, validate_config, ChatService, Config, LlmClient,
    SqliteTicketStore, SyncService, TicketApi, TicketFetcher, TicketStore, UpstreamClient,
};
use helpdesk_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("HELPDESK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Ticketing API: {}", config.upstream.zone_url);
    info!("Database path: {:?}", config.database.path);

    // Create SQLite ticket store
    let store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Ticket store initialized");

    // Create ticketing API client and sync service
    let api: Arc<dyn TicketApi> = Arc::new(
        UpstreamClient::new(&config.upstream).context("Failed to create ticketing API client")?,
    );
    let fetcher = TicketFetcher::new(api, &config.sync);
    let sync = Arc::new(SyncService::new(fetcher, Arc::clone(&store)));
    info!(
        page_size = config.sync.max_tickets_per_request,
        concurrency = config.sync.max_concurrent_requests,
        "Sync service initialized"
    );

    // Create chat, solution and summary services if an LLM is configured
    let llm = create_llm_clients(&config);
    let chat = llm.as_ref().map(|(analyst, summarizer)| {
        let mut service =
            ChatService::new(Arc::clone(analyst), Arc::clone(summarizer), Arc::clone(&store));
        if let Some(llm_config) = &config.llm {
            service = service.with_translation_max_tokens(llm_config.max_tokens);
        }
        Arc::new(service)
    });

    // Create app state
    let mut state = AppState::new(config.clone(), store, sync, chat);
    if let Some((analyst, _)) = llm {
        state = state.with_insights(analyst);
    }
    let state = Arc::new(state);

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Query model and cheaper summary model, when an LLM is configured.
fn create_llm_clients(config: &Config) -> Option<(Arc<dyn LlmClient>, Arc<dyn LlmClient>)> {
    let Some(llm_config) = &config.llm else {
        info!("No LLM configured, /chat, solution guides and summaries disabled");
        return None;
    };

    let clients = create_llm_client(llm_config, None).and_then(|analyst| {
        create_llm_client(llm_config, Some(&llm_config.summary_model))
            .map(|summarizer| (analyst, summarizer))
    });

    match clients {
        Ok((analyst, summarizer)) => {
            info!(
                provider = analyst.provider(),
                model = analyst.model(),
                summary_model = summarizer.model(),
                "LLM clients initialized"
            );
            Some((analyst, summarizer))
        }
        Err(e) => {
            warn!("Failed to create LLM client, LLM features disabled: {}", e);
            None
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
