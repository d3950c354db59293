//! Diagnostic codes and per-scan reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Template issues
    /// A template block could not be tokenized or parsed
    TemplateSyntaxError,

    /// A `config(...)` keyword argument could not be constant-folded
    ConfigResolutionFailed,

    /// A `ref(...)` argument could not be constant-folded to a name
    ReferenceResolutionFailed,

    /// A `ref(package, name)` call points outside the scanned project
    CrossProjectReference,

    // Declaration issues
    /// A config-definition file or entry does not have the expected shape
    UnrecognizedDeclaration,

    /// A config-definition file names a model that was never discovered
    UnknownModel,

    // Filesystem issues
    /// A single file could not be read; the scan continues without it
    UnreadableFile,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateSyntaxError => "TEMPLATE_SYNTAX_ERROR",
            Self::ConfigResolutionFailed => "CONFIG_RESOLUTION_FAILED",
            Self::ReferenceResolutionFailed => "REFERENCE_RESOLUTION_FAILED",
            Self::CrossProjectReference => "CROSS_PROJECT_REFERENCE",
            Self::UnrecognizedDeclaration => "UNRECOGNIZED_DECLARATION",
            Self::UnknownModel => "UNKNOWN_MODEL",
            Self::UnreadableFile => "UNREADABLE_FILE",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - part of an entity's configuration was left at defaults
    Warn,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

/// Source location in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path as discovered during the scan
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
        }
    }

    /// Create a location from a filesystem path
    pub fn from_path(path: &Path) -> Self {
        Self::new(path.display().to_string())
    }

    /// Create a location with file and line number
    pub fn with_line(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Entity the diagnostic is attached to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            entity: None,
        }
    }

    /// Shorthand for a warning
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Shorthand for an informational diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach the diagnostic to a named entity
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Emit this diagnostic through `tracing`.
    ///
    /// The library never installs a subscriber; callers decide where logs go.
    pub fn emit(&self) {
        let location = self
            .location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_default();

        match self.severity {
            Severity::Warn => tracing::warn!(code = %self.code, %location, "{}", self.message),
            Severity::Info => tracing::debug!(code = %self.code, %location, "{}", self.message),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::ConfigResolutionFailed.as_str(), "CONFIG_RESOLUTION_FAILED");
        assert_eq!(DiagnosticCode::TemplateSyntaxError.as_str(), "TEMPLATE_SYNTAX_ERROR");
        assert_eq!(DiagnosticCode::UnknownModel.as_str(), "UNKNOWN_MODEL");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::warn(
            DiagnosticCode::ConfigResolutionFailed,
            "Could not parse tags from config",
        )
        .with_location(Location::with_line("models/users.sql", 3))
        .with_entity("users");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("CONFIG_RESOLUTION_FAILED"));
        assert!(json.contains("\"warn\""));
        assert!(json.contains("\"users\""));
    }

    #[test]
    fn display_includes_location() {
        let diag = Diagnostic::info(DiagnosticCode::UnreadableFile, "permission denied")
            .with_location(Location::new("seeds/raw.csv"));

        assert_eq!(
            diag.to_string(),
            "[info] UNREADABLE_FILE: permission denied (seeds/raw.csv)"
        );
    }
}
