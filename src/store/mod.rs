//! Store seam
//!
//! The workload talks to the database only through these traits:
//!
//! - [`SessionFactory`] opens independent [`Session`]s, one connection each
//! - [`Session`] runs plain reads (catalog, read battery, auditor) and
//!   opens scoped transactions
//! - [`OrderTx`] is one scoped placement transaction. It ends in exactly one
//!   of `commit` or `rollback`; dropping it unfinished discards its writes.
//!
//! Two implementations: [`postgres`] for real runs and [`memory`] for tests
//! and dry runs.

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, MemoryStore};
pub use postgres::PgSessionFactory;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core_types::{LicenseId, OrderId, PaymentId, ProductId, UserId};
use crate::error::BenchError;
use crate::models::{
    NewLicense, NewOrder, NewOrderLine, NewPayment, OrderSummary, ProductDetail, ProductSales,
};

/// Kind of identifier the catalog can load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    User,
    Product,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::User => "user",
            IdentifierKind::Product => "product",
        }
    }
}

/// Opens sessions against one store
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a session that owns its own connection until dropped
    async fn open_session(&self) -> Result<Box<dyn Session>, BenchError>;
}

/// A single connection. Reads here are outside any placement transaction.
#[async_trait]
pub trait Session: Send {
    /// Identifiers in ascending order, at most `cap` of them
    async fn load_identifiers(
        &mut self,
        kind: IdentifierKind,
        cap: usize,
    ) -> Result<Vec<i64>, BenchError>;

    /// Current list price, `None` if the product no longer exists
    async fn product_price(&mut self, product_id: ProductId)
    -> Result<Option<Decimal>, BenchError>;

    async fn product_detail(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<ProductDetail>, BenchError>;

    /// A user's orders, newest first
    async fn recent_orders(
        &mut self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<OrderSummary>, BenchError>;

    /// Products ranked by number of order lines, highest first
    async fn top_products(&mut self, limit: i64) -> Result<Vec<ProductSales>, BenchError>;

    /// Paid orders whose payment is null or missing
    async fn count_paid_orders_missing_payment(&mut self) -> Result<i64, BenchError>;

    /// Order lines whose order is missing
    async fn count_orphan_order_lines(&mut self) -> Result<i64, BenchError>;

    /// Licenses whose user or product is missing
    async fn count_orphan_licenses(&mut self) -> Result<i64, BenchError>;

    /// Start a scoped placement transaction on this session's connection
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn OrderTx + 'a>, BenchError>;
}

/// One placement transaction
#[async_trait]
pub trait OrderTx: Send {
    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<PaymentId, BenchError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, BenchError>;

    async fn insert_order_line(&mut self, line: &NewOrderLine) -> Result<(), BenchError>;

    async fn insert_license(&mut self, license: &NewLicense) -> Result<LicenseId, BenchError>;

    async fn commit(self: Box<Self>) -> Result<(), BenchError>;

    async fn rollback(self: Box<Self>) -> Result<(), BenchError>;
}
