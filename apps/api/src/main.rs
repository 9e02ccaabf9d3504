mod config;
mod db;
mod dispatch;
mod errors;
mod evaluator;
mod models;
mod pipeline;
mod retriever;
mod retry;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, init_schema};
use crate::dispatch::local::LocalExecutor;
use crate::dispatch::queue::{spawn_workers, JobQueue, RedisJobQueue};
use crate::dispatch::{Dispatcher, ExecutionContext};
use crate::evaluator::llm::LlmEvaluator;
use crate::pipeline::Pipeline;
use crate::retriever::HttpContextRetriever;
use crate::retry::RetryPolicy;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::{PgDocumentStore, PgJobStore};
use crate::store::{DocumentStore, JobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screening API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    init_schema(&pool).await?;

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let documents: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));

    // Initialize Redis (primary dispatch substrate)
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis.clone()));
    info!("Redis queue client initialized");

    // Pipeline collaborators
    let retriever = Arc::new(HttpContextRetriever::new(config.retriever_url.clone()));
    let llm = Arc::new(LlmEvaluator::new(config.anthropic_api_key.clone()));
    info!("LLM evaluator initialized (model: {})", evaluator::llm::MODEL);

    let retry = RetryPolicy {
        max_attempts: config.retry_max_attempts,
        base_delay: config.retry_base_delay,
        jitter: true,
    };
    let pipe = Arc::new(Pipeline::new(retriever, llm, retry));

    let ctx = ExecutionContext {
        jobs: Arc::clone(&jobs),
        documents: Arc::clone(&documents),
        pipeline: pipe,
    };

    // Queue consumers and the local fallback executor
    spawn_workers(config.queue_workers, redis, ctx.clone());
    info!("Started {} queue workers", config.queue_workers);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        LocalExecutor::new(config.local_worker_limit),
        ctx,
    ));

    // Build app state
    let state = AppState {
        jobs,
        documents,
        dispatcher,
        queue,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
