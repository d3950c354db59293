//! Query-file preprocessing
//!
//! Prepares raw query text for macro extraction. SQL comments are left in
//! place since template blocks inside them (`-- depends_on: {{ ref(..) }}`)
//! still count; snapshot wrappers are unwrapped.

use regex::Regex;
use std::sync::LazyLock;

static RE_SNAPSHOT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%-?\s*snapshot\s+(\w+)\s*-?%\}(.*?)\{%-?\s*endsnapshot\s*-?%\}").unwrap()
});

/// Result of preprocessing one query file
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Template text ready for extraction
    pub template: String,

    /// Name declared by `{% snapshot <name> %}`, if the file had a wrapper
    pub snapshot_name: Option<String>,

    /// Lines dropped before `template` starts
    pub line_offset: usize,

    /// Whether any template syntax was detected
    pub had_jinja: bool,
}

/// Query-file preprocessor
pub struct QueryPreprocessor;

impl QueryPreprocessor {
    /// Check if SQL contains template syntax
    pub fn has_jinja(sql: &str) -> bool {
        sql.contains("{{") || sql.contains("{%") || sql.contains("{#")
    }

    /// Preprocess query text.
    ///
    /// For snapshots only the body of the first `snapshot` block is kept.
    pub fn preprocess(sql: &str, is_snapshot: bool) -> PreprocessResult {
        let had_jinja = Self::has_jinja(sql);
        let snapshot = if is_snapshot {
            RE_SNAPSHOT_BLOCK
                .captures(sql)
                .map(|caps| {
                    let body_start = caps.get(2).map(|m| m.start()).unwrap_or(0);
                    let offset = sql[..body_start].matches('\n').count();
                    (caps[1].to_string(), caps[2].to_string(), offset)
                })
        } else {
            None
        };
        let (template, snapshot_name, line_offset) = match snapshot {
            Some((name, body, offset)) => (body, Some(name), offset),
            None => (sql.to_string(), None, 0),
        };

        PreprocessResult {
            template,
            snapshot_name,
            line_offset,
            had_jinja,
        }
    }
}
