//! Run summary printed on stdout once all selected modes finish.

use serde::Serialize;

use crate::audit::AuditReport;
use crate::bench::{ReadSummary, WriteSummary};
use crate::error::BenchError;

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Read,
    Write,
    Audit,
    All,
}

impl RunMode {
    pub fn runs_read(self) -> bool {
        matches!(self, RunMode::Read | RunMode::All)
    }

    pub fn runs_write(self) -> bool {
        matches!(self, RunMode::Write | RunMode::All)
    }

    pub fn runs_audit(self) -> bool {
        matches!(self, RunMode::Audit | RunMode::All)
    }
}

impl std::str::FromStr for RunMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(RunMode::Read),
            "write" => Ok(RunMode::Write),
            "audit" => Ok(RunMode::Audit),
            "all" => Ok(RunMode::All),
            other => Err(BenchError::FatalSetupError(format!(
                "unknown mode '{}', expected read|write|audit|all",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub git_hash: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditReport>,
}

impl RunSummary {
    pub fn new(git_hash: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            git_hash: git_hash.into(),
            store: store.into(),
            ..Default::default()
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("read".parse::<RunMode>().unwrap(), RunMode::Read);
        assert_eq!("ALL".parse::<RunMode>().unwrap(), RunMode::All);
        assert!("bogus".parse::<RunMode>().is_err());

        assert!(RunMode::All.runs_read() && RunMode::All.runs_write() && RunMode::All.runs_audit());
        assert!(!RunMode::Audit.runs_write());
    }

    #[test]
    fn test_summary_omits_skipped_phases() {
        let mut summary = RunSummary::new("abc123", "memory");
        summary.audit = Some(AuditReport::default());

        let json: serde_json::Value =
            serde_json::from_str(&summary.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["store"], "memory");
        assert_eq!(json["audit"]["orphan_licenses"], 0);
        assert!(json.get("read").is_none());
        assert!(json.get("write").is_none());
    }
}
