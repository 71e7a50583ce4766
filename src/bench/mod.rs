//! Benchmark Harness Module
//!
//! # Components
//!
//! - [`intent`] - random order intent synthesis
//! - [`driver`] - read / write loops, session fan-out, summaries

pub mod driver;
pub mod intent;

pub use driver::{BenchDriver, ReadSummary, WriteSummary};
