//! In-memory store
//!
//! Mirrors the constraints the marketplace schema enforces (primary and
//! unique keys, foreign keys, `amount > 0`, `quantity >= 1`). Writes made
//! inside a transaction are staged and become visible only on commit, all
//! at once. IDs come from sequences that are not rolled back, so aborted
//! transactions leave gaps the way database sequences do.
//!
//! Test hooks:
//! - [`MemoryStore::inject_fault`] makes one chosen step fail once
//! - the `raw_*` / `delete_*` helpers bypass the placement path to create
//!   orphans for the auditor

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use tokio::sync::RwLock;

use super::{IdentifierKind, OrderTx, Session, SessionFactory};
use crate::core_types::{LicenseId, LineId, OrderId, PaymentId, ProductId, UserId};
use crate::error::BenchError;
use crate::models::{
    NewLicense, NewOrder, NewOrderLine, NewPayment, OrderSummary, PaymentMethod, ProductDetail,
    ProductSales,
};

const SEED_CATEGORIES: [&str; 8] = [
    "Action Games",
    "RPG",
    "Simulation",
    "Strategy",
    "Music",
    "Movie",
    "Productivity Software",
    "E-book",
];

const SEED_PUBLISHERS: usize = 10;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub name: String,
    pub price: Decimal,
    pub category_id: i64,
    pub publisher_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRow {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub status: String,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineRow {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRow {
    pub code: String,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub access_link: String,
}

/// Committed state. Cloned out by [`MemoryStore::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: BTreeSet<UserId>,
    pub categories: BTreeMap<i64, String>,
    pub publishers: BTreeMap<i64, String>,
    pub products: BTreeMap<ProductId, ProductRow>,
    pub payments: BTreeMap<PaymentId, PaymentRow>,
    pub orders: BTreeMap<OrderId, OrderRow>,
    pub order_lines: BTreeMap<(OrderId, LineId), OrderLineRow>,
    pub licenses: BTreeMap<LicenseId, LicenseRow>,
    license_codes: FxHashSet<String>,
}

impl Tables {
    fn insert_license(&mut self, id: LicenseId, row: LicenseRow) {
        self.license_codes.insert(row.code.clone());
        self.licenses.insert(id, row);
    }
}

/// Writes of one open transaction
#[derive(Debug, Default)]
struct Staged {
    payments: BTreeMap<PaymentId, PaymentRow>,
    orders: BTreeMap<OrderId, OrderRow>,
    order_lines: BTreeMap<(OrderId, LineId), OrderLineRow>,
    licenses: BTreeMap<LicenseId, LicenseRow>,
}

struct Sequences {
    payment: AtomicI64,
    order: AtomicI64,
    license: AtomicI64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            payment: AtomicI64::new(1),
            order: AtomicI64::new(1),
            license: AtomicI64::new(1),
        }
    }
}

// ============================================================================
// Fault injection
// ============================================================================

/// Step at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Next non-transactional read on any session
    Read,
    Payment,
    Order,
    /// Order line with this line number
    OrderLine(LineId),
    /// The n-th license inserted in a transaction, 1-based
    License(usize),
    Commit,
}

struct Fault {
    point: FaultPoint,
    error: BenchError,
}

fn fk_violation(constraint: &str) -> BenchError {
    BenchError::ConstraintViolation(format!(
        "insert violates foreign key constraint \"{}\"",
        constraint
    ))
}

fn unique_violation(constraint: &str) -> BenchError {
    BenchError::ConstraintViolation(format!(
        "duplicate key value violates unique constraint \"{}\"",
        constraint
    ))
}

fn check_violation(constraint: &str) -> BenchError {
    BenchError::ConstraintViolation(format!(
        "new row violates check constraint \"{}\"",
        constraint
    ))
}

// ============================================================================
// Store
// ============================================================================

/// Shared handle; clones see the same tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    sequences: Arc<Sequences>,
    faults: Arc<Mutex<Vec<Fault>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic reference data: users `1..=users`, products
    /// `1..=products` priced in `[2.00, 80.00]`, spread over the seed
    /// categories and publishers.
    pub fn seeded(users: usize, products: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tables = Tables::default();

        for (i, name) in SEED_CATEGORIES.iter().enumerate() {
            tables.categories.insert(i as i64 + 1, name.to_string());
        }
        for i in 1..=SEED_PUBLISHERS {
            tables
                .publishers
                .insert(i as i64, format!("Publisher_{}", i));
        }
        tables.users.extend(1..=users as i64);
        for id in 1..=products as i64 {
            let cents: i64 = rng.gen_range(200..=8000);
            tables.products.insert(
                id,
                ProductRow {
                    name: format!("Product_{}", id),
                    price: Decimal::new(cents, 2),
                    category_id: rng.gen_range(1..=SEED_CATEGORIES.len() as i64),
                    publisher_id: rng.gen_range(1..=SEED_PUBLISHERS as i64),
                },
            );
        }

        Self {
            tables: Arc::new(RwLock::new(tables)),
            ..Default::default()
        }
    }

    /// Copy of the committed tables
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    /// Arm a one-shot fault at `point`
    pub fn inject_fault(&self, point: FaultPoint, error: BenchError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault { point, error });
    }

    fn take_fault(&self, point: FaultPoint) -> Result<(), BenchError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.iter().position(|f| f.point == point) {
            Some(idx) => Err(faults.remove(idx).error),
            None => Ok(()),
        }
    }

    pub async fn add_user(&self, user_id: UserId) {
        self.tables.write().await.users.insert(user_id);
    }

    /// Add a product under category 1 / publisher 1, creating those if needed
    pub async fn add_product(&self, product_id: ProductId, price: Decimal) {
        let mut tables = self.tables.write().await;
        tables
            .categories
            .entry(1)
            .or_insert_with(|| SEED_CATEGORIES[0].to_string());
        tables
            .publishers
            .entry(1)
            .or_insert_with(|| "Publisher_1".to_string());
        tables.products.insert(
            product_id,
            ProductRow {
                name: format!("Product_{}", product_id),
                price,
                category_id: 1,
                publisher_id: 1,
            },
        );
    }

    pub async fn set_price(&self, product_id: ProductId, price: Decimal) {
        if let Some(p) = self.tables.write().await.products.get_mut(&product_id) {
            p.price = price;
        }
    }

    pub async fn delete_product(&self, product_id: ProductId) {
        self.tables.write().await.products.remove(&product_id);
    }

    pub async fn delete_user(&self, user_id: UserId) {
        self.tables.write().await.users.remove(&user_id);
    }

    pub async fn delete_payment(&self, payment_id: PaymentId) {
        self.tables.write().await.payments.remove(&payment_id);
    }

    pub async fn delete_order(&self, order_id: OrderId) {
        self.tables.write().await.orders.remove(&order_id);
    }

    /// Insert an order row without its payment check
    pub async fn raw_order(
        &self,
        user_id: UserId,
        payment_id: Option<PaymentId>,
        ordered_at: DateTime<Utc>,
    ) -> OrderId {
        let id = self.sequences.order.fetch_add(1, Ordering::SeqCst);
        self.tables.write().await.orders.insert(
            id,
            OrderRow {
                user_id,
                payment_id,
                status: "PAID".to_string(),
                ordered_at,
            },
        );
        id
    }

    /// Insert an order line without its foreign-key checks
    pub async fn raw_order_line(&self, order_id: OrderId, line_id: LineId, product_id: ProductId) {
        self.tables.write().await.order_lines.insert(
            (order_id, line_id),
            OrderLineRow {
                product_id,
                unit_price: Decimal::ONE,
                quantity: 1,
            },
        );
    }

    /// Insert a license without its foreign-key checks
    pub async fn raw_license(&self, user_id: UserId, product_id: ProductId) -> LicenseId {
        let id = self.sequences.license.fetch_add(1, Ordering::SeqCst);
        let code = format!("RAW-{}", id);
        self.tables.write().await.insert_license(
            id,
            LicenseRow {
                access_link: crate::models::access_link("raw://", product_id, &code),
                code,
                user_id,
                product_id,
            },
        );
        id
    }
}

#[async_trait]
impl SessionFactory for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, BenchError> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct MemorySession {
    store: MemoryStore,
}

#[async_trait]
impl Session for MemorySession {
    async fn load_identifiers(
        &mut self,
        kind: IdentifierKind,
        cap: usize,
    ) -> Result<Vec<i64>, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let ids = match kind {
            IdentifierKind::User => tables.users.iter().copied().take(cap).collect(),
            IdentifierKind::Product => tables.products.keys().copied().take(cap).collect(),
        };
        Ok(ids)
    }

    async fn product_price(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<Decimal>, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        Ok(tables.products.get(&product_id).map(|p| p.price))
    }

    async fn product_detail(
        &mut self,
        product_id: ProductId,
    ) -> Result<Option<ProductDetail>, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let detail = tables.products.get(&product_id).and_then(|p| {
            let category_name = tables.categories.get(&p.category_id)?;
            let publisher_name = tables.publishers.get(&p.publisher_id)?;
            Some(ProductDetail {
                product_id,
                name: p.name.clone(),
                price: p.price,
                category_name: category_name.clone(),
                publisher_name: publisher_name.clone(),
            })
        });
        Ok(detail)
    }

    async fn recent_orders(
        &mut self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<OrderSummary>, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let mut rows: Vec<OrderSummary> = tables
            .orders
            .iter()
            .filter(|(_, o)| o.user_id == user_id)
            .map(|(id, o)| {
                let payment = o.payment_id.and_then(|pid| tables.payments.get(&pid));
                OrderSummary {
                    order_id: *id,
                    ordered_at: o.ordered_at,
                    payment_method: payment.map(|p| p.method.as_str().to_string()),
                    amount: payment.map(|p| p.amount),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.ordered_at
                .cmp(&a.ordered_at)
                .then(b.order_id.cmp(&a.order_id))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn top_products(&mut self, limit: i64) -> Result<Vec<ProductSales>, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let mut counts: BTreeMap<ProductId, i64> = BTreeMap::new();
        for line in tables.order_lines.values() {
            *counts.entry(line.product_id).or_default() += 1;
        }
        let mut ranked: Vec<ProductSales> = counts
            .into_iter()
            .map(|(product_id, sales)| ProductSales { product_id, sales })
            .collect();
        ranked.sort_by(|a, b| b.sales.cmp(&a.sales).then(a.product_id.cmp(&b.product_id)));
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }

    async fn count_paid_orders_missing_payment(&mut self) -> Result<i64, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let count = tables
            .orders
            .values()
            .filter(|o| o.status == "PAID")
            .filter(|o| match o.payment_id {
                Some(pid) => !tables.payments.contains_key(&pid),
                None => true,
            })
            .count();
        Ok(count as i64)
    }

    async fn count_orphan_order_lines(&mut self) -> Result<i64, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let count = tables
            .order_lines
            .keys()
            .filter(|(order_id, _)| !tables.orders.contains_key(order_id))
            .count();
        Ok(count as i64)
    }

    async fn count_orphan_licenses(&mut self) -> Result<i64, BenchError> {
        self.store.take_fault(FaultPoint::Read)?;
        let tables = self.store.tables.read().await;
        let count = tables
            .licenses
            .values()
            .filter(|l| {
                !tables.users.contains(&l.user_id) || !tables.products.contains_key(&l.product_id)
            })
            .count();
        Ok(count as i64)
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn OrderTx + 'a>, BenchError> {
        Ok(Box::new(MemoryTx {
            store: self.store.clone(),
            staged: Staged::default(),
            licenses_inserted: 0,
        }))
    }
}

// ============================================================================
// Transaction
// ============================================================================

pub struct MemoryTx {
    store: MemoryStore,
    staged: Staged,
    licenses_inserted: usize,
}

impl MemoryTx {
    fn order_visible(&self, tables: &Tables, order_id: OrderId) -> bool {
        self.staged.orders.contains_key(&order_id) || tables.orders.contains_key(&order_id)
    }

    /// Foreign-key and uniqueness checks against the committed tables at
    /// commit time; another session may have changed them since staging.
    fn validate_against(&self, tables: &Tables) -> Result<(), BenchError> {
        for order in self.staged.orders.values() {
            if !tables.users.contains(&order.user_id) {
                return Err(fk_violation("orders_tb_user_id_fkey"));
            }
        }
        for (key, line) in &self.staged.order_lines {
            if tables.order_lines.contains_key(key) {
                return Err(unique_violation("order_lines_tb_pkey"));
            }
            if !tables.products.contains_key(&line.product_id) {
                return Err(fk_violation("order_lines_tb_product_id_fkey"));
            }
        }
        for license in self.staged.licenses.values() {
            if tables.license_codes.contains(&license.code) {
                return Err(unique_violation("licenses_tb_license_code_key"));
            }
            if !tables.users.contains(&license.user_id) {
                return Err(fk_violation("licenses_tb_user_id_fkey"));
            }
            if !tables.products.contains_key(&license.product_id) {
                return Err(fk_violation("licenses_tb_product_id_fkey"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrderTx for MemoryTx {
    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<PaymentId, BenchError> {
        self.store.take_fault(FaultPoint::Payment)?;
        if payment.amount <= Decimal::ZERO {
            return Err(check_violation("payments_tb_amount_check"));
        }

        let id = self.store.sequences.payment.fetch_add(1, Ordering::SeqCst);
        self.staged.payments.insert(
            id,
            PaymentRow {
                method: payment.method,
                amount: payment.amount,
                paid_at: payment.paid_at,
            },
        );
        Ok(id)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, BenchError> {
        self.store.take_fault(FaultPoint::Order)?;
        {
            let tables = self.store.tables.read().await;
            if !tables.users.contains(&order.user_id) {
                return Err(fk_violation("orders_tb_user_id_fkey"));
            }
            if !self.staged.payments.contains_key(&order.payment_id)
                && !tables.payments.contains_key(&order.payment_id)
            {
                return Err(fk_violation("orders_tb_payment_id_fkey"));
            }
        }

        let id = self.store.sequences.order.fetch_add(1, Ordering::SeqCst);
        self.staged.orders.insert(
            id,
            OrderRow {
                user_id: order.user_id,
                payment_id: Some(order.payment_id),
                status: order.status.as_str().to_string(),
                ordered_at: order.ordered_at,
            },
        );
        Ok(id)
    }

    async fn insert_order_line(&mut self, line: &NewOrderLine) -> Result<(), BenchError> {
        self.store.take_fault(FaultPoint::OrderLine(line.line_id))?;
        if line.quantity < 1 {
            return Err(check_violation("order_lines_tb_quantity_check"));
        }

        let key = (line.order_id, line.line_id);
        {
            let tables = self.store.tables.read().await;
            if !self.order_visible(&tables, line.order_id) {
                return Err(fk_violation("order_lines_tb_order_id_fkey"));
            }
            if !tables.products.contains_key(&line.product_id) {
                return Err(fk_violation("order_lines_tb_product_id_fkey"));
            }
            if self.staged.order_lines.contains_key(&key) || tables.order_lines.contains_key(&key)
            {
                return Err(unique_violation("order_lines_tb_pkey"));
            }
        }

        self.staged.order_lines.insert(
            key,
            OrderLineRow {
                product_id: line.product_id,
                unit_price: line.unit_price,
                quantity: line.quantity,
            },
        );
        Ok(())
    }

    async fn insert_license(&mut self, license: &NewLicense) -> Result<LicenseId, BenchError> {
        self.licenses_inserted += 1;
        self.store
            .take_fault(FaultPoint::License(self.licenses_inserted))?;
        {
            let tables = self.store.tables.read().await;
            let staged_dup = self
                .staged
                .licenses
                .values()
                .any(|l| l.code == license.code);
            if staged_dup || tables.license_codes.contains(&license.code) {
                return Err(unique_violation("licenses_tb_license_code_key"));
            }
            if !tables.users.contains(&license.user_id) {
                return Err(fk_violation("licenses_tb_user_id_fkey"));
            }
            if !tables.products.contains_key(&license.product_id) {
                return Err(fk_violation("licenses_tb_product_id_fkey"));
            }
        }

        let id = self.store.sequences.license.fetch_add(1, Ordering::SeqCst);
        self.staged.licenses.insert(
            id,
            LicenseRow {
                code: license.code.clone(),
                user_id: license.user_id,
                product_id: license.product_id,
                access_link: license.access_link.clone(),
            },
        );
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), BenchError> {
        self.store.take_fault(FaultPoint::Commit)?;

        let lock = Arc::clone(&self.store.tables);
        let mut tables = lock.write().await;
        self.validate_against(&tables)?;

        let MemoryTx { staged, .. } = *self;
        tables.payments.extend(staged.payments);
        tables.orders.extend(staged.orders);
        tables.order_lines.extend(staged.order_lines);
        for (id, row) in staged.licenses {
            tables.insert_license(id, row);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BenchError> {
        Ok(())
    }
}
