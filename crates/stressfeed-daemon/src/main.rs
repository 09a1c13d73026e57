//! stressfeed daemon.
//!
//! Wires the three source adapters to one freshness arbiter and serves
//! the HTTP surface.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `stressfeed-config.yaml` (or `STRESSFEED_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the shared feed context (arbiter + fanout hub)
//! 4. Start each configured adapter; unconfigured ones are reported once
//! 5. Start the HTTP server
//! 6. Run until `Ctrl-C`, then cancel every task and wait for them

mod config;
mod error;

use std::sync::Arc;

use anyhow::Context;
use stressfeed_core::FeedContext;
use stressfeed_server::{AppState, spawn_server};
use stressfeed_sources::{
    BucketAdapter, DatabaseAdapter, DocumentStore, MemoryDocuments, PollSchedule,
    PostgresDocuments, PushFeedAdapter, run_poller, s3_store,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{DatabaseSection, LoggingSection, StressfeedConfig};
use crate::error::DaemonError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration.
    let config = StressfeedConfig::load().map_err(DaemonError::from)?;

    // 2. Logging.
    init_logging(&config.logging)?;
    let config_path = StressfeedConfig::path();
    info!(
        config = %config_path.display(),
        config_found = config_path.exists(),
        port = config.server.port,
        push_feed = config.push_feed.url.is_some(),
        object_store = config.object_store.bucket.is_some(),
        database = config.database.url.is_some() || config.database.in_memory,
        "stressfeed starting"
    );

    // 3. Shared context.
    let feed = FeedContext::new();
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    // 4. Adapters.
    start_push_feed(&config, &feed, &cancel, &mut tasks).await;
    start_object_store(&config, &feed, &cancel, &mut tasks);
    let documents = open_documents(&config.database).await;
    if let Some(store) = &documents {
        let adapter = DatabaseAdapter::new(store.clone(), feed.clone());
        let schedule = PollSchedule::every(config.database.poll_interval());
        tasks.spawn(run_poller(adapter, schedule, cancel.clone()));
        info!(backend = store.backend(), "Database adapter started");
    }

    // 5. HTTP server.
    let mut state = AppState::new(feed)
        .with_stream(config.stream.to_settings())
        .with_shutdown(cancel.clone());
    if let Some(store) = documents.clone() {
        state = state.with_documents(store);
    }
    let server = spawn_server(
        &config.server.to_server_config(),
        Arc::new(state),
        cancel.clone(),
    )
    .await
    .map_err(DaemonError::from)?;

    // 6. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Adapter task failed");
        }
    }
    if let Err(e) = server.await {
        error!(error = %e, "HTTP server task failed");
    }
    if let Some(DocumentStore::Postgres(pg)) = documents {
        pg.close().await;
    }

    info!("stressfeed stopped");
    Ok(())
}

fn init_logging(logging: &LoggingSection) -> Result<(), DaemonError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| DaemonError::Logging {
            message: format!("invalid log level {:?}: {e}", logging.level),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn start_push_feed(
    config: &StressfeedConfig,
    feed: &FeedContext,
    cancel: &CancellationToken,
    tasks: &mut JoinSet<()>,
) {
    let Some(push) = config.push_feed.to_adapter_config() else {
        warn!("Push feed disabled: no broker URL configured (push_feed.url / NATS_URL)");
        return;
    };

    let client = match stressfeed_sources::push::connect(&push).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Push feed disabled: broker client could not be created");
            return;
        }
    };

    let adapter = PushFeedAdapter::new(feed.clone(), &push.application_id);
    let cancel = cancel.clone();
    tasks.spawn(async move {
        if let Err(e) = adapter.run(client, cancel).await {
            error!(error = %e, "Push feed stopped");
        }
    });
    info!(application_id = %push.application_id, "Push feed adapter started");
}

fn start_object_store(
    config: &StressfeedConfig,
    feed: &FeedContext,
    cancel: &CancellationToken,
    tasks: &mut JoinSet<()>,
) {
    let Some(bucket) = config.object_store.to_adapter_config() else {
        warn!("Object store disabled: no bucket configured (object_store.bucket / S3_BUCKET_NAME)");
        return;
    };

    let store = match s3_store(&bucket) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Object store disabled: client could not be built");
            return;
        }
    };

    let adapter = BucketAdapter::new(store, &bucket.prefix, feed.clone());
    let schedule = PollSchedule::every(config.object_store.poll_interval());
    tasks.spawn(run_poller(adapter, schedule, cancel.clone()));
    info!(bucket = %bucket.bucket, prefix = %bucket.prefix, "Object store adapter started");
}

async fn open_documents(database: &DatabaseSection) -> Option<DocumentStore> {
    let Some(pg_config) = database.to_postgres_config() else {
        if database.in_memory {
            info!("Using in-memory document store");
            return Some(DocumentStore::Memory(MemoryDocuments::new()));
        }
        warn!("Database disabled: no URL configured (database.url / DATABASE_URL)");
        return None;
    };

    // Lazy: an unreachable database is a transient failure that each poll
    // retries, not a reason to disable the adapter.
    let pg = match PostgresDocuments::connect_lazy(&pg_config) {
        Ok(pg) => pg,
        Err(e) => {
            error!(error = %e, "Database disabled: invalid configuration");
            return None;
        }
    };
    let migrated = if database.run_migrations {
        pg.run_migrations().await
    } else {
        Ok(())
    };
    if let Err(e) = migrated {
        warn!(error = %e, "Migrations did not run, polling anyway");
    }
    Some(DocumentStore::Postgres(pg))
}
