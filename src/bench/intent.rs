//! Workload Synthesizer
//!
//! Builds one random order intent: "build cart, price it", ahead of the
//! checkout transaction.
//!
//! Prices are read on the session connection before the placement
//! transaction begins. A concurrent price change therefore never aborts an
//! order, but the captured unit price may be stale by the time it is
//! written. That staleness is accepted: the order line records the price
//! the customer was shown.

use rand::Rng;
use rand::seq::index;

use crate::catalog::IdentifierCatalog;
use crate::core_types::{ProductId, UserId};
use crate::error::BenchError;
use crate::models::{IntentLine, OrderIntent};
use crate::store::Session;

/// Quantities are drawn from `1..=MAX_QUANTITY`
pub const MAX_QUANTITY: i32 = 3;

/// Draw a user from the catalog and synthesize an intent for them.
///
/// Returns `SynthesisFailure` when no valid intent exists for this draw;
/// other errors come from the price reads.
pub async fn synthesize_intent<R: Rng + Send>(
    session: &mut dyn Session,
    catalog: &IdentifierCatalog,
    rng: &mut R,
    max_lines: usize,
) -> Result<OrderIntent, BenchError> {
    let user_id = catalog
        .random_user(rng)
        .ok_or_else(|| BenchError::SynthesisFailure("user pool is empty".into()))?;

    synthesize_for_user(session, user_id, catalog.products(), rng, max_lines).await
}

/// Synthesize an intent for a fixed user.
///
/// 1. `n` uniform in `[1, max_lines]`
/// 2. `n` distinct products sampled without replacement
/// 3. live price per product, quantity uniform in `[1, 3]`
pub async fn synthesize_for_user<R: Rng + Send>(
    session: &mut dyn Session,
    user_id: UserId,
    products: &[ProductId],
    rng: &mut R,
    max_lines: usize,
) -> Result<OrderIntent, BenchError> {
    if max_lines == 0 {
        return Err(BenchError::SynthesisFailure(
            "max_lines must be >= 1".into(),
        ));
    }

    let n = rng.gen_range(1..=max_lines);
    if products.len() < n {
        return Err(BenchError::SynthesisFailure(format!(
            "requested {} distinct products, pool has {}",
            n,
            products.len()
        )));
    }

    let chosen: Vec<ProductId> = index::sample(&mut *rng, products.len(), n)
        .into_iter()
        .map(|i| products[i])
        .collect();

    let mut lines = Vec::with_capacity(n);
    for product_id in chosen {
        let Some(unit_price) = session.product_price(product_id).await? else {
            return Err(BenchError::SynthesisFailure(format!(
                "product {} has no price row",
                product_id
            )));
        };
        let quantity = rng.gen_range(1..=MAX_QUANTITY);
        lines.push(IntentLine {
            product_id,
            unit_price,
            quantity,
        });
    }

    OrderIntent::new(user_id, lines).ok_or_else(|| {
        BenchError::SynthesisFailure("cart total is not strictly positive".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultPoint, MemoryStore, SessionFactory};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal::Decimal;
    use rustc_hash::FxHashSet;

    #[tokio::test]
    async fn test_intent_lines_are_distinct_and_priced_live() {
        let store = MemoryStore::seeded(10, 50, 11);
        let tables = store.snapshot().await;
        let products: Vec<ProductId> = tables.products.keys().copied().collect();
        let mut session = store.open_session().await.unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..50 {
            let intent = synthesize_for_user(session.as_mut(), 3, &products, &mut rng, 5)
                .await
                .unwrap();
            assert!((1..=5).contains(&intent.lines().len()));

            let distinct: FxHashSet<_> = intent.lines().iter().map(|l| l.product_id).collect();
            assert_eq!(distinct.len(), intent.lines().len());

            for line in intent.lines() {
                assert_eq!(line.unit_price, tables.products[&line.product_id].price);
                assert!((1..=MAX_QUANTITY).contains(&line.quantity));
            }
            assert!(intent.total() > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_small_pool_never_duplicates() {
        let store = MemoryStore::seeded(1, 2, 1);
        let mut session = store.open_session().await.unwrap();
        let mut rng = StdRng::seed_from_u64(99);

        let mut built = 0;
        let mut skipped = 0;
        for _ in 0..100 {
            match synthesize_for_user(session.as_mut(), 1, &[1, 2], &mut rng, 5).await {
                Ok(intent) => {
                    assert!(intent.lines().len() <= 2);
                    built += 1;
                }
                Err(BenchError::SynthesisFailure(_)) => skipped += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(built + skipped, 100);
        assert!(built > 0 && skipped > 0);
    }

    #[tokio::test]
    async fn test_deleted_product_fails_synthesis() {
        let store = MemoryStore::seeded(1, 1, 1);
        store.delete_product(1).await;
        let mut session = store.open_session().await.unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let err = synthesize_for_user(session.as_mut(), 1, &[1], &mut rng, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYNTHESIS_FAILURE");
    }

    #[tokio::test]
    async fn test_zero_price_fails_synthesis() {
        let store = MemoryStore::new();
        store.add_user(1).await;
        store.add_product(1, Decimal::ZERO).await;
        let mut session = store.open_session().await.unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let err = synthesize_for_user(session.as_mut(), 1, &[1], &mut rng, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYNTHESIS_FAILURE");
    }

    #[tokio::test]
    async fn test_empty_user_pool_fails_synthesis() {
        let store = MemoryStore::seeded(0, 3, 1);
        let mut session = store.open_session().await.unwrap();
        let catalog = IdentifierCatalog::new(vec![], vec![1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(1);

        let err = synthesize_intent(session.as_mut(), &catalog, &mut rng, 2)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYNTHESIS_FAILURE");
    }

    #[tokio::test]
    async fn test_price_read_error_propagates() {
        let store = MemoryStore::seeded(1, 3, 1);
        store.inject_fault(FaultPoint::Read, BenchError::ConnectivityError("reset".into()));
        let mut session = store.open_session().await.unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let err = synthesize_for_user(session.as_mut(), 1, &[1, 2, 3], &mut rng, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONNECTIVITY_ERROR");
    }
}
