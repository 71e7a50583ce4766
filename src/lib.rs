//! Marketplace Bench - transactional workload harness for a digital-goods
//! marketplace schema.
//!
//! Drives a read battery and a write workload (payment, order, order lines
//! and licenses in one transaction) against PostgreSQL or an in-memory
//! store, then audits the final state for referential damage.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases
//! - [`models`] - Order intents, row inputs and read results
//! - [`error`] - Error taxonomy
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing setup
//! - [`db`] - PostgreSQL pool
//! - [`store`] - Session / transaction seams and their two stores
//! - [`catalog`] - Identifier pools loaded at startup
//! - [`bench`] - Workload synthesis and the driver
//! - [`placement`] - Order placement transaction
//! - [`perf`] - Latency statistics
//! - [`audit`] - Consistency auditor
//! - [`report`] - Run summary

// Core types - must be first!
pub mod core_types;

pub mod audit;
pub mod bench;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod perf;
pub mod placement;
pub mod report;
pub mod store;

// Convenient re-exports at crate root
pub use audit::{AuditReport, run_audit};
pub use bench::{BenchDriver, ReadSummary, WriteSummary};
pub use catalog::IdentifierCatalog;
pub use config::{AppConfig, BenchConfig, StoreKind};
pub use core_types::{LicenseId, LineId, OrderId, PaymentId, ProductId, UserId};
pub use error::BenchError;
pub use models::{IntentLine, OrderIntent, PaymentMethod};
pub use perf::{LatencyRecorder, LatencySummary};
pub use placement::place_order;
pub use report::{RunMode, RunSummary};
pub use store::{MemoryStore, OrderTx, PgSessionFactory, Session, SessionFactory};
