//! Consistency Auditor
//!
//! Three counting checks over the final state. Counts are observations,
//! never errors; only a store failure aborts the audit.

use serde::Serialize;

use crate::error::BenchError;
use crate::store::Session;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub missing_payment_for_paid_order: i64,
    pub orphan_order_lines: i64,
    pub orphan_licenses: i64,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing_payment_for_paid_order == 0
            && self.orphan_order_lines == 0
            && self.orphan_licenses == 0
    }
}

pub async fn run_audit(session: &mut dyn Session) -> Result<AuditReport, BenchError> {
    let report = AuditReport {
        missing_payment_for_paid_order: session.count_paid_orders_missing_payment().await?,
        orphan_order_lines: session.count_orphan_order_lines().await?,
        orphan_licenses: session.count_orphan_licenses().await?,
    };

    if report.is_clean() {
        tracing::info!("Consistency audit clean");
    } else {
        tracing::warn!(
            missing_payment = report.missing_payment_for_paid_order,
            orphan_order_lines = report.orphan_order_lines,
            orphan_licenses = report.orphan_licenses,
            "Consistency audit found violations"
        );
    }
    Ok(report)
}
