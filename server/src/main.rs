//! Stampede ingestion service.
//!
//! Wires the pipeline together: Redis Streams purchase log, Postgres
//! order store and catalog, Kafka provisioning publisher (degrading to
//! no-op when the broker is down), and the stream ingestor driving the
//! commit path. Runs until SIGINT, then drains with a bounded
//! deadline.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use stampede_core::{IdMinter, IngestorConfig, PurchaseCommitter, StreamIngestor};
use stampede_postgres::{PgOrderStore, PgProductCatalog};
use stampede_redis::RedisEventLog;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampede=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        product_id = config.sale.product_id,
        stream = %config.redis.stream,
        group = %config.redis.group,
        "starting Stampede ingestion service"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("failed to connect to PostgreSQL")?;
    info!("order store connected");

    let log = Arc::new(
        RedisEventLog::connect(
            &config.redis.url,
            &config.redis.stream,
            &config.redis.group,
            &config.redis.consumer,
        )
        .await
        .context("failed to connect to Redis")?,
    );
    info!("event log connected");

    // Kafka is a soft dependency: if unreachable, orders still commit
    // and delivery is disabled until restart.
    let publisher = stampede_kafka::connect_or_noop(
        &config.kafka.brokers,
        &config.kafka.topic,
        Duration::from_secs(config.kafka.send_timeout),
    );

    let committer = Arc::new(PurchaseCommitter::new(
        Arc::new(PgProductCatalog::new(pool.clone())),
        Arc::new(PgOrderStore::new(pool)),
        publisher,
        Arc::new(IdMinter::new()),
    ));

    let ingestor = StreamIngestor::new(
        log,
        committer,
        IngestorConfig::new(config.sale.product_id),
    );
    let handle = ingestor.start().await.context("failed to start ingestor")?;
    info!("ingestion running, press Ctrl-C to stop");

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining");

    handle
        .shutdown(Duration::from_secs(config.lifecycle.shutdown_timeout))
        .await
        .context("drain did not finish before the deadline")?;
    info!("goodbye");
    Ok(())
}
