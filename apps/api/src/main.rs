use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::digest::run_digest_scheduler;
use notification_cell::{
    mailer_from_config, InMemoryJobQueue, JobQueue, NotificationProducer, NotificationWorker, RedisJobQueue,
    WorkerConfig,
};
use shared_config::AppConfig;

/// Redis when configured and reachable, otherwise an in-process queue.
async fn build_queue(config: &AppConfig) -> Arc<dyn JobQueue> {
    if config.redis_url.is_some() {
        match RedisJobQueue::new(config).await {
            Ok(queue) => {
                info!("Notification queue backed by Redis");
                return queue.shared();
            }
            Err(e) => warn!("Redis unavailable ({}), falling back to in-memory queue", e),
        }
    } else {
        warn!("REDIS_URL not set, notifications use an in-memory queue");
    }
    InMemoryJobQueue::new().shared()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hospital Management API server");

    // Load configuration
    let config = AppConfig::from_env();
    let port = config.server_port;
    let state = Arc::new(config);

    // Notifications: queue, background workers and the digest schedule
    let queue = build_queue(&state).await;
    let producer = NotificationProducer::new(queue.clone(), &state);

    let worker = NotificationWorker::new(
        WorkerConfig::from_app_config(&state),
        queue,
        mailer_from_config(&state),
    );
    tokio::spawn(async move {
        if let Err(e) = worker.start().await {
            error!("Notification workers stopped: {}", e);
        }
    });
    tokio::spawn(run_digest_scheduler(state.clone(), producer.clone()));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(state, producer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
