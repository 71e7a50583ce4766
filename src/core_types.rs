//! Core types used throughout the system
//!
//! Identifier aliases for the marketplace tables. All of them map to
//! Postgres `BIGINT` primary keys, so they are signed.

/// User account ID (`users_tb.user_id`).
pub type UserId = i64;

/// Product ID (`products_tb.product_id`).
pub type ProductId = i64;

/// Payment ID, generated by the store on insert.
pub type PaymentId = i64;

/// Order ID, generated by the store on insert.
///
/// # Constraints:
/// - Owns exactly one payment and one or more order lines
/// - Never reused, even when the transaction that drew it rolled back
pub type OrderId = i64;

/// License ID, generated by the store on insert.
pub type LicenseId = i64;

/// Per-order line number, contiguous from 1.
pub type LineId = i32;
