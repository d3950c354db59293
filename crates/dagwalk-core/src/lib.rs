//! dagwalk core
//!
//! Shared, stable types used across the parser crates.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use report::{ScanReport, ReportVersion, ReportSummary};
pub use config::{ScanSettings, ConfigError};
