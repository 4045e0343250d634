//! rollcall - connects, migrates and warms every cache.
//!
//! Useful as a smoke test against a live database: each snapshot is loaded
//! once on its own pooled connection and the sizes are logged.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rollcall::{Config, DataLayer, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rollcall=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting rollcall...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    if config.db_debug {
        info!("SQL tracing enabled (target rollcall::sql)");
    }

    info!("Connecting to PostgreSQL...");
    let db = Database::connect(&config.database_url, config.max_connections)
        .await
        .context("failed to connect to database")?
        .trace_sql(config.db_debug);

    if config.run_migrations {
        db.migrate().await.context("failed to run migrations")?;
    } else {
        info!("Skipping migrations (RUN_MIGRATIONS=0)");
    }

    let layer = DataLayer::new();
    info!("Data layer initialized");

    let (groups, users, teachers, timeline) = futures::try_join!(
        async {
            let mut gw = db.gateway().await?;
            let groups = layer.groups.all(&mut gw).await?;
            Ok::<_, anyhow::Error>(groups.len())
        },
        async {
            let mut gw = db.gateway().await?;
            let users = layer.users.all(&mut gw).await?;
            Ok::<_, anyhow::Error>(users.len())
        },
        async {
            let mut gw = db.gateway().await?;
            let teachers = layer.teachers.all(&mut gw).await?;
            Ok::<_, anyhow::Error>(teachers.len())
        },
        async {
            let mut gw = db.gateway().await?;
            let timeline = layer.timeline.all(&mut gw).await?;
            Ok::<_, anyhow::Error>(timeline.len())
        },
    )
    .context("failed to warm caches")?;

    info!(
        "Caches warm: {} groups, {} user rows, {} teacher assignments, {} running modules",
        groups, users, teachers, timeline
    );

    Ok(())
}
