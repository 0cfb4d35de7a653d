//! RAG Chat Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ragchat_agent::StageModels;
use ragchat_config::{load_settings, Settings};
use ragchat_core::{ChatStore, Embedder, LanguageModel, VectorSearch};
use ragchat_llm::LlmFactory;
use ragchat_persistence::InMemoryChatStore;
use ragchat_rag::{MultiRetriever, OllamaEmbedder, VectorStore};
use ragchat_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("RAGCHAT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!("Starting RAG Chat Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let models = init_models(&config);
    if let Some(model) = &models.response {
        if !model.is_available().await {
            tracing::warn!(
                model = model.model_name(),
                "Response model unreachable at startup, turns fall back until it is up"
            );
        }
    }
    let retriever = init_retriever(&config);
    let store = init_store(&config).await;

    let state = AppState::new(config.clone(), models, retriever, store);
    tracing::info!(
        distributed = state.is_distributed_store(),
        "Initialized application state"
    );

    let cleanup_shutdown = state.sessions.start_cleanup_task();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], config.server.port)));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("ragchat={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

/// One model per pipeline stage; disabled or failed stages get none
fn init_models(config: &Settings) -> StageModels {
    let llm = &config.llm;
    let models = StageModels {
        decomposition: LlmFactory::for_stage("decomposition", llm, &llm.decomposition),
        multiquery: LlmFactory::for_stage("multiquery", llm, &llm.multiquery),
        response: LlmFactory::for_stage("response", llm, &llm.response),
        evaluation: LlmFactory::for_stage("evaluation", llm, &llm.evaluation),
        summarization: LlmFactory::for_stage("summarization", llm, &llm.summarization),
    };

    tracing::info!(
        decomposition = models.decomposition.is_some(),
        multiquery = models.multiquery.is_some(),
        response = models.response.is_some(),
        evaluation = models.evaluation.is_some(),
        summarization = models.summarization.is_some(),
        "Stage models initialized"
    );
    models
}

/// Embedder and vector store; retrieval is disabled if either is missing
fn init_retriever(config: &Settings) -> MultiRetriever {
    if !config.rag.enabled {
        tracing::info!("RAG disabled, retrieval will return no chunks");
        return MultiRetriever::disabled();
    }

    let embedder: Option<Arc<dyn Embedder>> = if config.embedding.is_enabled() {
        match OllamaEmbedder::new((&config.embedding).into()) {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize embedder");
                None
            }
        }
    } else {
        None
    };

    let search: Option<Arc<dyn VectorSearch>> = match VectorStore::new((&config.rag).into()) {
        Ok(store) => {
            tracing::info!(
                endpoint = %config.rag.qdrant_endpoint,
                collection = %config.rag.qdrant_collection,
                "VectorStore initialized for RAG"
            );
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to initialize VectorStore. RAG will be disabled.");
            None
        }
    };

    MultiRetriever::new((&config.rag).into(), embedder, search)
}

/// ScyllaDB when enabled and reachable, in-memory otherwise
async fn init_store(config: &Settings) -> Arc<dyn ChatStore> {
    if !config.persistence.enabled {
        tracing::info!("Persistence disabled, using in-memory chat store");
        return Arc::new(InMemoryChatStore::new());
    }

    tracing::info!("Initializing ScyllaDB persistence layer...");
    match ragchat_persistence::init((&config.persistence).into()).await {
        Ok(store) => {
            tracing::info!(
                hosts = ?config.persistence.scylla_hosts,
                keyspace = %config.persistence.keyspace,
                "ScyllaDB persistence initialized"
            );
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(
                "Failed to initialize ScyllaDB: {}. Falling back to in-memory.",
                e
            );
            Arc::new(InMemoryChatStore::new())
        }
    }
}
