use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use face_match::{
    api,
    config::{Config, QueueBackend, StorageBackend, VectorizerBackend},
    consumer::QueueConsumer,
    domain::ImageService,
    matcher::MatchingEngine,
    object_store as obj,
    queue::{LocalQueue, MessageQueue, PubSubQueue},
    storage::Database,
    vectorizer::{CommandVectorizer, HttpVectorizer, Vectorizer},
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "face-match starting");

    // Load configuration
    let config = Config::load()?;
    info!(mode = ?config.worker.mode, "Loaded configuration");

    // Initialize database
    let db = Database::open(&config.node.data_dir)?;
    info!("Database opened at: {}", config.node.data_dir);

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::Gcs => {
            let bucket = config
                .storage
                .gcs_bucket
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("GCS_BUCKET is required when STORAGE_BACKEND=gcs"))?;
            let store =
                obj::GcsStore::new(bucket, config.storage.gcs_credentials_file.as_deref()).await?;
            info!("Using GCS storage backend, bucket: {}", bucket);
            Arc::new(store)
        }
    };

    // Initialize queue backend
    let queue: Arc<dyn MessageQueue> = match config.queue.backend {
        QueueBackend::Local => {
            info!(queue = %config.queue.name, "Using local queue backend");
            Arc::new(LocalQueue::new(
                db.clone(),
                config.queue.visibility_timeout(),
            ))
        }
        QueueBackend::PubSub => {
            let project = config.queue.pubsub_project.as_deref().ok_or_else(|| {
                anyhow::anyhow!("PUBSUB_PROJECT is required when QUEUE_BACKEND=pubsub")
            })?;
            let queue = PubSubQueue::new(
                project,
                &config.queue.name,
                &config.queue.pubsub_subscription,
                config.queue.pubsub_credentials_file.as_deref(),
            )
            .await?;
            info!(
                project = %project,
                topic = %config.queue.name,
                subscription = %config.queue.pubsub_subscription,
                "Using Pub/Sub queue backend"
            );
            Arc::new(queue)
        }
    };

    // Start queue consumers
    let cancel = CancellationToken::new();
    let mut consumer_handles = Vec::new();
    if config.worker.mode.runs_workers() {
        let vectorizer = build_vectorizer(&config)?;
        let engine = MatchingEngine::new(
            db.clone(),
            Arc::clone(&object_store),
            vectorizer,
            config.matcher.distance_threshold,
            config.matcher.embedding_size,
        );

        for _ in 0..config.worker.count {
            let consumer = QueueConsumer::new(
                Arc::clone(&queue),
                engine.clone(),
                config.queue.batch_size,
                config.queue.poll_interval(),
            );
            consumer_handles.push(tokio::spawn(consumer.run(cancel.child_token())));
        }
        info!(count = config.worker.count, "Started queue consumers");
    }

    if config.worker.mode.runs_api() {
        // Create shared state
        let state = Arc::new(AppState {
            config: config.clone(),
            images: ImageService::new(
                db.clone(),
                object_store,
                queue,
                config.allowed_extensions.clone(),
            ),
            db,
        });

        // Build and start the HTTP server
        let app = api::create_router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
        info!("Listening on: {}", config.node.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    // Cleanup: let consumers finish the image in hand
    info!("Shutting down queue consumers");
    cancel.cancel();
    for handle in consumer_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Queue consumer task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_vectorizer(config: &Config) -> anyhow::Result<Arc<dyn Vectorizer>> {
    let vectorizer: Arc<dyn Vectorizer> = match config.vectorizer.backend {
        VectorizerBackend::Command => {
            let mut vectorizer = CommandVectorizer::new(&config.vectorizer.command)?;
            if let (Some(mounted), Some(host)) = (
                config.vectorizer.mounted_data_dir.as_deref(),
                config.vectorizer.host_data_dir.as_deref(),
            ) {
                vectorizer = vectorizer.with_path_rewrite(mounted, host);
            }
            info!(command = %config.vectorizer.command, "Using command vectorizer");
            Arc::new(vectorizer)
        }
        VectorizerBackend::Http => {
            let url = config.vectorizer.url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("VECTORIZER_URL is required when VECTORIZER_BACKEND=http")
            })?;
            info!(url = %url, "Using HTTP vectorizer");
            Arc::new(HttpVectorizer::new(url)?)
        }
    };
    Ok(vectorizer)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("Shutdown signal received, draining connections");
}
