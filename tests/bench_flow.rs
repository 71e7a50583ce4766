use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use marketplace_bench::audit::run_audit;
use marketplace_bench::bench::BenchDriver;
use marketplace_bench::catalog::IdentifierCatalog;
use marketplace_bench::config::{AppConfig, BenchConfig};
use marketplace_bench::core_types::{LineId, OrderId};
use marketplace_bench::models::round_money;
use marketplace_bench::store::memory::Tables;
use marketplace_bench::store::{MemoryStore, SessionFactory};

async fn driver_for(store: &MemoryStore, config: BenchConfig) -> BenchDriver {
    let mut session = store.open_session().await.unwrap();
    let catalog = IdentifierCatalog::load(session.as_mut(), &config)
        .await
        .unwrap();
    BenchDriver::new(Arc::new(store.clone()), Arc::new(catalog), config)
}

/// Every committed order: positive payment equal to its line sum, lines
/// numbered 1..=n, one license per line owned by the ordering user.
fn assert_committed_orders_well_formed(t: &Tables) {
    let mut lines_by_order: BTreeMap<OrderId, Vec<LineId>> = BTreeMap::new();
    let mut sums: BTreeMap<OrderId, Decimal> = BTreeMap::new();
    for ((order_id, line_id), line) in &t.order_lines {
        lines_by_order.entry(*order_id).or_default().push(*line_id);
        *sums.entry(*order_id).or_default() += line.unit_price * Decimal::from(line.quantity);
    }

    for (order_id, order) in &t.orders {
        let payment = &t.payments[&order.payment_id.expect("committed order has payment")];
        assert!(payment.amount > Decimal::ZERO);
        assert_eq!(payment.amount, round_money(sums[order_id]), "order {}", order_id);

        let line_ids = &lines_by_order[order_id];
        let expected: Vec<LineId> = (1..=line_ids.len() as LineId).collect();
        assert_eq!(line_ids, &expected, "order {}", order_id);

        for line_id in line_ids {
            let prefix = format!("TX-{}-{}-", order_id, line_id);
            let owned: Vec<_> = t
                .licenses
                .values()
                .filter(|l| l.code.starts_with(&prefix))
                .collect();
            assert_eq!(owned.len(), 1, "order {} line {}", order_id, line_id);
            assert_eq!(owned[0].user_id, order.user_id);
            assert_eq!(
                owned[0].product_id,
                t.order_lines[&(*order_id, *line_id)].product_id
            );
        }
    }

    assert_eq!(t.payments.len(), t.orders.len());
    assert_eq!(t.licenses.len(), t.order_lines.len());
}

#[tokio::test]
async fn full_run_read_write_audit_is_clean() {
    let store = MemoryStore::seeded(50, 120, 123);
    let config = BenchConfig {
        read_iterations: 20,
        write_iterations: 60,
        ..Default::default()
    };
    let driver = driver_for(&store, config).await;

    let reads = driver.run_reads().await.unwrap();
    assert_eq!(reads.latency.count, 60);
    assert_eq!(reads.errors, 0);

    let writes = driver.run_writes().await.unwrap();
    assert_eq!(writes.successes, 60);
    assert_eq!(writes.failures, 0);
    assert_eq!(writes.synthesis_failures, 0);
    assert!(writes.p95_ms <= writes.max_ms);
    assert!(writes.approx_throughput > 0.0);

    let t = store.snapshot().await;
    assert_eq!(t.orders.len(), 60);
    assert_committed_orders_well_formed(&t);

    let mut session = store.open_session().await.unwrap();
    let audit = run_audit(session.as_mut()).await.unwrap();
    assert!(audit.is_clean());
}

#[tokio::test]
async fn concurrent_sessions_keep_every_bundle_intact() {
    let store = MemoryStore::seeded(30, 80, 7);
    let config = BenchConfig {
        write_iterations: 101,
        sessions: 4,
        ..Default::default()
    };
    let summary = driver_for(&store, config).await.run_writes().await.unwrap();

    assert_eq!(summary.sessions, 4);
    assert_eq!(summary.successes, 101);

    let t = store.snapshot().await;
    assert_eq!(t.orders.len(), 101);
    assert_committed_orders_well_formed(&t);

    let mut session = store.open_session().await.unwrap();
    assert!(run_audit(session.as_mut()).await.unwrap().is_clean());
}

#[tokio::test]
async fn every_write_failing_still_produces_a_summary() {
    let store = MemoryStore::seeded(3, 10, 1);
    let config = BenchConfig {
        write_iterations: 12,
        ..Default::default()
    };
    let driver = driver_for(&store, config).await;
    for user in 1..=3 {
        store.delete_user(user).await;
    }

    let summary = driver.run_writes().await.unwrap();
    assert_eq!(summary.successes, 0);
    assert_eq!(summary.failures, 12);
    assert_eq!(summary.constraint_violations, 12);
    assert_eq!(summary.approx_throughput, 0.0);

    let t = store.snapshot().await;
    assert!(t.payments.is_empty());
    assert!(t.orders.is_empty());
    assert!(t.order_lines.is_empty());
    assert!(t.licenses.is_empty());
}

#[tokio::test]
async fn auditor_reports_injected_damage() {
    let store = MemoryStore::seeded(10, 10, 3);
    let config = BenchConfig {
        write_iterations: 5,
        ..Default::default()
    };
    driver_for(&store, config).await.run_writes().await.unwrap();

    store.raw_order(1, None, Utc::now()).await;
    store.raw_order_line(9_999, 1, 1).await;
    store.raw_license(1, 9_999).await;
    store.raw_license(9_999, 1).await;

    let mut session = store.open_session().await.unwrap();
    let audit = run_audit(session.as_mut()).await.unwrap();
    assert_eq!(audit.missing_payment_for_paid_order, 1);
    assert_eq!(audit.orphan_order_lines, 1);
    assert_eq!(audit.orphan_licenses, 2);
}

#[test]
fn memory_config_parses() {
    let yaml = r#"
log_level: info
log_dir: ./logs
log_file: bench.log
use_json: false
rotation: never
store: memory
bench:
  write_iterations: 10
  sessions: 2
"#;
    let config = AppConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.bench.write_iterations, 10);
    assert_eq!(config.bench.sessions, 2);
    assert_eq!(config.bench.read_iterations, 200);
    assert_eq!(config.bench.max_lines_per_order, 4);
}
