//! Scan report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::{Diagnostic, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of seed entities
    pub seeds: usize,

    /// Number of model entities (snapshots included)
    pub models: usize,

    /// Number of test entities
    pub tests: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of info messages
    pub info: usize,
}

/// Result summary of one catalog scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Schema version
    pub version: ReportVersion,

    /// Scanned project
    pub project_name: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All diagnostics, in the order they were recorded
    pub diagnostics: Vec<Diagnostic>,
}

impl ScanReport {
    /// Build a report from entity counts and the scan's diagnostics
    pub fn new(
        project_name: impl Into<String>,
        counts: (usize, usize, usize),
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let (seeds, models, tests) = counts;
        let summary = ReportSummary {
            seeds,
            models,
            tests,
            warnings: diagnostics.iter().filter(|d| d.severity == Severity::Warn).count(),
            info: diagnostics.iter().filter(|d| d.severity == Severity::Info).count(),
        };

        Self {
            version: ReportVersion::CURRENT,
            project_name: project_name.into(),
            summary,
            diagnostics,
        }
    }

    /// True when no entity had part of its configuration dropped
    pub fn is_clean(&self) -> bool {
        self.summary.warnings == 0
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
