//! Binary entrypoint: config, logging, migrations, and the axum server that
//! wires the HTTP surface to the persistence and object-store gateways.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use diesel::Connection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::AsyncPgConnection;
use diesel_migrations::MigrationHarness;

use archive_swarm_coordinator::config::Args;
use archive_swarm_coordinator::http::state::{AppState, Metrics};
use archive_swarm_coordinator::http::{redirect, router};
use archive_swarm_coordinator::objectstore::S3ObjectStore;
use archive_swarm_coordinator::store::{PgStore, Store};
use archive_swarm_coordinator::MIGRATIONS;

/// Runs the embedded migrations against `database_url` on a blocking thread;
/// `diesel_migrations`'s `MigrationHarness` is synchronous, so it's driven
/// through `diesel-async`'s `AsyncConnectionWrapper` the way the corpus's
/// indexer crates bootstrap their schema.
async fn run_migrations(database_url: String) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
        Ok::<_, anyhow::Error>(())
    })
    .await??;
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if !(args.content_threshold > 0.0 && args.content_threshold < 1.0) {
        anyhow::bail!(
            "content_threshold must lie in (0, 1), got {}",
            args.content_threshold
        );
    }

    let database_url = args.database_url();
    run_migrations(database_url.clone()).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::connect(&database_url, args.db_pool_size).await?);

    let objects = Arc::new(
        S3ObjectStore::from_config(
            args.s3_region.clone(),
            args.s3_endpoint.clone(),
            args.s3_access_key.clone(),
            args.s3_secret_key.clone(),
            args.s3_bucket.clone(),
            Duration::from_secs(args.s3_presign_ttl_secs),
        )
        .await?,
    );

    match store.stats().await {
        Ok(stats) if stats.batch_finished == 0 => {
            tracing::warn!(
                "no batches are finished yet; verification is impossible until the first \
                 finalize, so every dispatch necessarily returns an unfinished batch"
            );
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = ?err, "failed to read startup stats"),
    }

    let state = AppState {
        store,
        objects,
        config: Arc::new(args.clone()),
        metrics: Arc::new(Metrics::new()?),
    };

    let app = router(state);

    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!(%bind_addr, "starting archive swarm coordinator");

    if args.tls_cert.is_some() && args.tls_key.is_some() {
        let redirect_addr: SocketAddr = format!("{}:80", args.host).parse()?;
        redirect::spawn(redirect_addr, args.public_host.clone()).await?;
    }

    axum::Server::bind(&bind_addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
