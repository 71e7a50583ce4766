//! Benchmark Driver
//!
//! Read mode runs the read battery; write mode repeatedly synthesizes an
//! intent and places it. Both time every attempt into a
//! [`LatencyRecorder`]. No attempt error escapes the loop: it is
//! classified, tallied, and the next iteration starts.
//!
//! With `sessions > 1` the iterations are split across independent
//! sessions running in parallel, each on its own connection with its own
//! RNG. The catalog is the only state they share, read-only.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::bench::intent::synthesize_intent;
use crate::catalog::IdentifierCatalog;
use crate::config::BenchConfig;
use crate::core_types::OrderId;
use crate::error::BenchError;
use crate::perf::{LatencyRecorder, LatencySummary};
use crate::placement::place_order;
use crate::store::{Session, SessionFactory};

/// Queries issued per read iteration
pub const READ_QUERIES_PER_ITERATION: usize = 3;

// ============================================================================
// Tallies and summaries
// ============================================================================

#[derive(Debug, Default)]
pub struct ReadTally {
    pub latencies: LatencyRecorder,
    pub errors: usize,
}

impl ReadTally {
    pub fn merge(&mut self, other: ReadTally) {
        self.latencies.merge(other.latencies);
        self.errors += other.errors;
    }
}

#[derive(Debug, Default)]
pub struct WriteTally {
    pub latencies: LatencyRecorder,
    pub successes: usize,
    pub failures: usize,
    pub synthesis_failures: usize,
    pub constraint_violations: usize,
    pub connectivity_errors: usize,
}

impl WriteTally {
    pub fn merge(&mut self, other: WriteTally) {
        self.latencies.merge(other.latencies);
        self.successes += other.successes;
        self.failures += other.failures;
        self.synthesis_failures += other.synthesis_failures;
        self.constraint_violations += other.constraint_violations;
        self.connectivity_errors += other.connectivity_errors;
    }

    fn record(&mut self, outcome: &AttemptOutcome, elapsed: std::time::Duration) {
        match outcome {
            AttemptOutcome::Committed(_) => {
                self.successes += 1;
                self.latencies.record(elapsed);
            }
            AttemptOutcome::SynthesisFailure(_) => {
                self.synthesis_failures += 1;
            }
            AttemptOutcome::Failed(err) => {
                self.failures += 1;
                self.latencies.record(elapsed);
                match err {
                    BenchError::ConstraintViolation(_) => self.constraint_violations += 1,
                    _ => self.connectivity_errors += 1,
                }
            }
        }
    }
}

/// Read-mode report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadSummary {
    #[serde(flatten)]
    pub latency: LatencySummary,
    pub errors: usize,
}

impl ReadSummary {
    pub fn from_tally(tally: &ReadTally) -> Self {
        Self {
            latency: tally.latencies.summary(),
            errors: tally.errors,
        }
    }
}

/// Write-mode report. `attempts` excludes synthesis failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WriteSummary {
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub synthesis_failures: usize,
    pub constraint_violations: usize,
    pub connectivity_errors: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub approx_throughput: f64,
    pub sessions: usize,
}

impl WriteSummary {
    pub fn from_tally(tally: &WriteTally, sessions: usize) -> Self {
        let latency = tally.latencies.summary();
        Self {
            attempts: tally.successes + tally.failures,
            successes: tally.successes,
            failures: tally.failures,
            synthesis_failures: tally.synthesis_failures,
            constraint_violations: tally.constraint_violations,
            connectivity_errors: tally.connectivity_errors,
            mean_ms: latency.mean_ms,
            p95_ms: latency.p95_ms,
            max_ms: latency.max_ms,
            approx_throughput: tally.latencies.approx_throughput(tally.successes),
            sessions,
        }
    }
}

/// Classified result of one write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Committed(OrderId),
    /// No intent could be built; not a write attempt
    SynthesisFailure(String),
    Failed(BenchError),
}

impl From<Result<OrderId, BenchError>> for AttemptOutcome {
    fn from(result: Result<OrderId, BenchError>) -> Self {
        match result {
            Ok(order_id) => AttemptOutcome::Committed(order_id),
            Err(BenchError::SynthesisFailure(reason)) => AttemptOutcome::SynthesisFailure(reason),
            Err(e) => AttemptOutcome::Failed(e),
        }
    }
}

// ============================================================================
// Per-session loops
// ============================================================================

/// Synthesize one intent and try to place it.
pub async fn attempt_order(
    session: &mut dyn Session,
    catalog: &IdentifierCatalog,
    config: &BenchConfig,
    rng: &mut StdRng,
) -> AttemptOutcome {
    try_place(session, catalog, config, rng).await.into()
}

async fn try_place(
    session: &mut dyn Session,
    catalog: &IdentifierCatalog,
    config: &BenchConfig,
    rng: &mut StdRng,
) -> Result<OrderId, BenchError> {
    let intent = synthesize_intent(session, catalog, rng, config.max_lines_per_order).await?;
    place_order(session, &intent, rng, &config.download_base_url).await
}

pub async fn run_writes_in_session(
    session: &mut dyn Session,
    catalog: &IdentifierCatalog,
    config: &BenchConfig,
    iterations: usize,
    rng: &mut StdRng,
    session_idx: usize,
) -> WriteTally {
    let mut tally = WriteTally {
        latencies: LatencyRecorder::with_capacity(iterations),
        ..Default::default()
    };

    for _ in 0..iterations {
        let started = Instant::now();
        let outcome = attempt_order(session, catalog, config, rng).await;
        let elapsed = started.elapsed();

        match &outcome {
            AttemptOutcome::Committed(order_id) => {
                tracing::debug!(session = session_idx, order_id, "Write attempt committed");
            }
            AttemptOutcome::SynthesisFailure(reason) => {
                tracing::debug!(session = session_idx, %reason, "Synthesis failure, attempt skipped");
            }
            AttemptOutcome::Failed(err) => {
                tracing::warn!(
                    session = session_idx,
                    code = err.code(),
                    error = %err,
                    "Write attempt failed and was rolled back"
                );
            }
        }
        tally.record(&outcome, elapsed);
    }

    tally
}

pub async fn run_reads_in_session(
    session: &mut dyn Session,
    catalog: &IdentifierCatalog,
    config: &BenchConfig,
    iterations: usize,
    rng: &mut StdRng,
    session_idx: usize,
) -> ReadTally {
    let mut tally = ReadTally {
        latencies: LatencyRecorder::with_capacity(iterations * READ_QUERIES_PER_ITERATION),
        errors: 0,
    };

    for _ in 0..iterations {
        if let Some(product_id) = catalog.random_product(rng) {
            let started = Instant::now();
            let result = session.product_detail(product_id).await.map(|_| ());
            tally.observe("product_detail", result, started, session_idx);
        }

        if let Some(user_id) = catalog.random_user(rng) {
            let started = Instant::now();
            let result = session
                .recent_orders(user_id, config.recent_orders_limit)
                .await
                .map(|_| ());
            tally.observe("recent_orders", result, started, session_idx);
        }

        let started = Instant::now();
        let result = session
            .top_products(config.top_products_limit)
            .await
            .map(|_| ());
        tally.observe("top_products", result, started, session_idx);
    }

    tally
}

impl ReadTally {
    fn observe(
        &mut self,
        query: &'static str,
        result: Result<(), BenchError>,
        started: Instant,
        session_idx: usize,
    ) {
        let elapsed = started.elapsed();
        match result {
            Ok(()) => self.latencies.record(elapsed),
            Err(err) => {
                self.errors += 1;
                tracing::warn!(session = session_idx, query, error = %err, "Read query failed");
            }
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Split `total` iterations over `sessions`, earlier sessions taking the
/// remainder.
pub fn split_iterations(total: usize, sessions: usize) -> Vec<usize> {
    let sessions = sessions.max(1);
    let base = total / sessions;
    let extra = total % sessions;
    (0..sessions)
        .map(|i| base + usize::from(i < extra))
        .collect()
}

pub fn session_rng(seed: u64, session_idx: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(session_idx as u64))
}

pub struct BenchDriver {
    factory: Arc<dyn SessionFactory>,
    catalog: Arc<IdentifierCatalog>,
    config: BenchConfig,
}

impl BenchDriver {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        catalog: Arc<IdentifierCatalog>,
        config: BenchConfig,
    ) -> Self {
        Self {
            factory,
            catalog,
            config,
        }
    }

    pub async fn run_reads(&self) -> Result<ReadSummary, BenchError> {
        tracing::info!(
            iterations = self.config.read_iterations,
            sessions = self.config.sessions,
            "[TEST] SELECT query performance"
        );

        let plan = split_iterations(self.config.read_iterations, self.config.sessions);
        let handles = plan.into_iter().enumerate().map(|(idx, iterations)| {
            let factory = Arc::clone(&self.factory);
            let catalog = Arc::clone(&self.catalog);
            let config = self.config.clone();
            tokio::spawn(async move {
                let mut session = factory.open_session().await.map_err(BenchError::into_fatal)?;
                let mut rng = session_rng(config.seed, idx);
                Ok::<_, BenchError>(
                    run_reads_in_session(
                        session.as_mut(),
                        &catalog,
                        &config,
                        iterations,
                        &mut rng,
                        idx,
                    )
                    .await,
                )
            })
        });

        let mut total = ReadTally::default();
        for joined in join_all(handles).await {
            let tally = joined
                .map_err(|e| BenchError::FatalSetupError(format!("read session aborted: {}", e)))??;
            total.merge(tally);
        }

        let summary = ReadSummary::from_tally(&total);
        tracing::info!(
            total_queries = summary.latency.count,
            errors = summary.errors,
            avg_ms = format!("{:.2}", summary.latency.mean_ms),
            p95_ms = format!("{:.2}", summary.latency.p95_ms),
            max_ms = format!("{:.2}", summary.latency.max_ms),
            "Read benchmark finished"
        );
        Ok(summary)
    }

    pub async fn run_writes(&self) -> Result<WriteSummary, BenchError> {
        tracing::info!(
            iterations = self.config.write_iterations,
            sessions = self.config.sessions,
            max_lines = self.config.max_lines_per_order,
            "[TEST] Transactional write performance"
        );

        let plan = split_iterations(self.config.write_iterations, self.config.sessions);
        let handles = plan.into_iter().enumerate().map(|(idx, iterations)| {
            let factory = Arc::clone(&self.factory);
            let catalog = Arc::clone(&self.catalog);
            let config = self.config.clone();
            tokio::spawn(async move {
                let mut session = factory.open_session().await.map_err(BenchError::into_fatal)?;
                let mut rng = session_rng(config.seed, idx);
                Ok::<_, BenchError>(
                    run_writes_in_session(
                        session.as_mut(),
                        &catalog,
                        &config,
                        iterations,
                        &mut rng,
                        idx,
                    )
                    .await,
                )
            })
        });

        let mut total = WriteTally::default();
        for joined in join_all(handles).await {
            let tally = joined.map_err(|e| {
                BenchError::FatalSetupError(format!("write session aborted: {}", e))
            })??;
            total.merge(tally);
        }

        let summary = WriteSummary::from_tally(&total, self.config.sessions);
        tracing::info!(
            attempts = summary.attempts,
            success = summary.successes,
            failures = summary.failures,
            synthesis_failures = summary.synthesis_failures,
            avg_ms = format!("{:.2}", summary.mean_ms),
            p95_ms = format!("{:.2}", summary.p95_ms),
            max_ms = format!("{:.2}", summary.max_ms),
            approx_tps = format!("{:.2}", summary.approx_throughput),
            "Write benchmark finished"
        );
        Ok(summary)
    }
}
