//! Identifier Catalog
//!
//! Candidate user and product IDs, read once at startup and shared
//! read-only by every session. Any store error while loading is fatal to
//! the run.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::BenchConfig;
use crate::core_types::{ProductId, UserId};
use crate::error::BenchError;
use crate::store::{IdentifierKind, Session};

/// Load up to `cap` identifiers of one kind, ascending.
pub async fn load_identifiers(
    session: &mut dyn Session,
    kind: IdentifierKind,
    cap: usize,
) -> Result<Vec<i64>, BenchError> {
    let ids = session.load_identifiers(kind, cap).await.map_err(|e| {
        BenchError::FatalSetupError(format!("loading {} identifiers: {}", kind.as_str(), e))
    })?;
    tracing::debug!(kind = kind.as_str(), cap, loaded = ids.len(), "Identifiers loaded");
    Ok(ids)
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierCatalog {
    users: Vec<UserId>,
    products: Vec<ProductId>,
}

impl IdentifierCatalog {
    pub fn new(users: Vec<UserId>, products: Vec<ProductId>) -> Self {
        Self { users, products }
    }

    pub async fn load(session: &mut dyn Session, config: &BenchConfig) -> Result<Self, BenchError> {
        let users = load_identifiers(session, IdentifierKind::User, config.user_pool_size).await?;
        let products =
            load_identifiers(session, IdentifierKind::Product, config.product_pool_size).await?;

        tracing::info!(
            users = users.len(),
            products = products.len(),
            "Identifier catalog loaded"
        );
        Ok(Self { users, products })
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn products(&self) -> &[ProductId] {
        &self.products
    }

    pub fn random_user<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<UserId> {
        self.users.choose(rng).copied()
    }

    pub fn random_product<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ProductId> {
        self.products.choose(rng).copied()
    }
}
