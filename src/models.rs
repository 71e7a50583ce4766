//! Domain models for the order-placement workload
//!
//! [`OrderIntent`] is the in-memory cart produced by the synthesizer. Its
//! constructor is the only way to build one, so an intent that reaches the
//! placement transaction always has at least one line, distinct products,
//! and a strictly positive total.
//!
//! The `New*` structs are the rows written by one placement transaction, in
//! insertion order: payment, order, order line, license.

use crate::core_types::{LineId, OrderId, PaymentId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rustc_hash::FxHashSet;
use std::fmt;
use std::str::FromStr;

/// Decimal places of every stored money column (`NUMERIC(10,2)`).
pub const MONEY_SCALE: u32 = 2;

/// Round a money value the way a `NUMERIC(_, 2)` column stores it.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// ============================================================================
// Enumerated tags
// ============================================================================

/// Payment method tag stored in `payments_tb.payment_method`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    CreditCard,
    PayPal,
    GiftCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::CreditCard,
        PaymentMethod::PayPal,
        PaymentMethod::GiftCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CreditCard",
            PaymentMethod::PayPal => "PayPal",
            PaymentMethod::GiftCard => "GiftCard",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreditCard" => Ok(PaymentMethod::CreditCard),
            "PayPal" => Ok(PaymentMethod::PayPal),
            "GiftCard" => Ok(PaymentMethod::GiftCard),
            _ => Err(format!("unknown payment method: {}", s)),
        }
    }
}

/// Order status tag. The workload only ever writes paid orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Order intent
// ============================================================================

/// One priced cart line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentLine {
    pub product_id: ProductId,
    /// Price snapshot taken during synthesis
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl IntentLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A not-yet-persisted order.
///
/// # Invariants
/// - `lines` is non-empty
/// - product IDs are pairwise distinct
/// - every quantity is >= 1
/// - `total == Σ unit_price × quantity` and `total > 0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    user_id: UserId,
    lines: Vec<IntentLine>,
    total: Decimal,
}

impl OrderIntent {
    /// Build an intent, or `None` when the lines violate an invariant.
    pub fn new(user_id: UserId, lines: Vec<IntentLine>) -> Option<Self> {
        if lines.is_empty() {
            return None;
        }

        let mut seen = FxHashSet::default();
        let mut total = Decimal::ZERO;
        for line in &lines {
            if line.quantity < 1 || !seen.insert(line.product_id) {
                return None;
            }
            total += line.line_total();
        }

        if total <= Decimal::ZERO {
            return None;
        }

        Some(Self {
            user_id,
            lines,
            total,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Lines in cart order; line numbers are assigned from this order.
    pub fn lines(&self) -> &[IntentLine] {
        &self.lines
    }

    /// Unrounded sum of line totals
    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Amount charged on the payment row
    pub fn payment_amount(&self) -> Decimal {
        round_money(self.total)
    }
}

// ============================================================================
// Rows written by the placement transaction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_id: PaymentId,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub line_id: LineId,
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLicense {
    pub code: String,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub access_link: String,
}

impl NewLicense {
    /// License for one order line. `suffix` disambiguates retries of the
    /// same order/line pair.
    pub fn for_line(
        line: &NewOrderLine,
        user_id: UserId,
        suffix: u16,
        download_base_url: &str,
    ) -> Self {
        let code = format!("TX-{}-{}-{}", line.order_id, line.line_id, suffix);
        let access_link = access_link(download_base_url, line.product_id, &code);
        Self {
            code,
            user_id,
            product_id: line.product_id,
            access_link,
        }
    }
}

/// Download locator for a license; a pure function of product and code.
pub fn access_link(base_url: &str, product_id: ProductId, code: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), product_id, code)
}

// ============================================================================
// Read-mode result rows
// ============================================================================

/// Product with its category and publisher joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetail {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub category_name: String,
    pub publisher_name: String,
}

/// One row of a user's order history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub ordered_at: DateTime<Utc>,
    pub payment_method: Option<String>,
    pub amount: Option<Decimal>,
}

/// Aggregate order-line count for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub sales: i64,
}
