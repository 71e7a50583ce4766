//! Marketplace Bench
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Catalog  │───▶│  Driver  │───▶│ Auditor  │
//! │  (YAML)  │    │ (IDs)    │    │(Read/Wr.)│    │ (Counts) │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Usage: `marketplace_bench [--env dev] [--mode read|write|audit|all]`

use std::sync::Arc;

use anyhow::Context;

use marketplace_bench::audit::run_audit;
use marketplace_bench::bench::BenchDriver;
use marketplace_bench::catalog::IdentifierCatalog;
use marketplace_bench::config::{AppConfig, StoreKind};
use marketplace_bench::db::Database;
use marketplace_bench::error::BenchError;
use marketplace_bench::report::{RunMode, RunSummary};
use marketplace_bench::store::{MemoryStore, PgSessionFactory, SessionFactory};

/// Synthetic reference data for the in-memory store
const MEMORY_SEED_USERS: usize = 1000;
const MEMORY_SEED_PRODUCTS: usize = 2000;

fn get_arg(long: &str, short: Option<&str>) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        let hit = args[i] == long || short.is_some_and(|s| args[i] == s);
        if hit && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg("--env", Some("-e")).unwrap_or_else(|| "dev".to_string())
}

fn get_mode() -> Result<RunMode, BenchError> {
    match get_arg("--mode", Some("-m")) {
        Some(mode) => mode.parse(),
        None => Ok(RunMode::All),
    }
}

async fn build_factory(config: &AppConfig) -> Result<Arc<dyn SessionFactory>, BenchError> {
    match config.store {
        StoreKind::Postgres => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                BenchError::FatalSetupError("postgres_url is not configured".into())
            })?;
            let db = Database::connect(url, &config.database)
                .await
                .map_err(|e| BenchError::from(e).into_fatal())?;
            db.health_check()
                .await
                .map_err(|e| BenchError::from(e).into_fatal())?;
            tracing::info!(
                max_connections = config.database.max_connections,
                "Connected to PostgreSQL"
            );
            Ok(Arc::new(PgSessionFactory::new(db)))
        }
        StoreKind::Memory => {
            tracing::info!(
                users = MEMORY_SEED_USERS,
                products = MEMORY_SEED_PRODUCTS,
                "Using seeded in-memory store"
            );
            Ok(Arc::new(MemoryStore::seeded(
                MEMORY_SEED_USERS,
                MEMORY_SEED_PRODUCTS,
                config.bench.seed,
            )))
        }
    }
}

async fn run(config: &AppConfig, mode: RunMode) -> Result<RunSummary, BenchError> {
    let factory = build_factory(config).await?;
    let mut summary = RunSummary::new(env!("GIT_HASH"), factory.name());

    let mut setup_session = factory
        .open_session()
        .await
        .map_err(BenchError::into_fatal)?;
    let catalog = IdentifierCatalog::load(setup_session.as_mut(), &config.bench).await?;
    drop(setup_session);

    let driver = BenchDriver::new(
        Arc::clone(&factory),
        Arc::new(catalog),
        config.bench.clone(),
    );

    if mode.runs_read() {
        summary.read = Some(driver.run_reads().await?);
    }
    if mode.runs_write() {
        summary.write = Some(driver.run_writes().await?);
    }
    if mode.runs_audit() {
        let mut session = factory
            .open_session()
            .await
            .map_err(BenchError::into_fatal)?;
        summary.audit = Some(run_audit(session.as_mut()).await?);
    }

    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mode = get_mode()?;
    let app_config =
        AppConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?;
    let _log_guard = marketplace_bench::logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        ?mode,
        store = ?app_config.store,
        "Starting marketplace bench in {} env",
        env
    );

    let summary = match run(&app_config, mode).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Benchmark aborted");
            return Err(e.into());
        }
    };

    println!("{}", summary.to_json_pretty()?);
    tracing::info!("Benchmark complete");
    Ok(())
}
