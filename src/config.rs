//! Diff options consumed at the engine boundary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// Default bound on the zigzag search window, in tokens.
const DEFAULT_MAX_MATCHING_OFFSET: usize = 500;

/// Whether diagnostics keep human readable kind labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Keep kind labels on tokens for logs and JSON output.
    Debug,
    #[default]
    Release,
}

/// Options for one diff computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffOptions {
    /// Placeholder text rendered in an alignment row.
    pub alignment_text: String,
    /// Moves spanning fewer newlines than this are not reported as moves.
    pub minimum_lines_moved: usize,
    /// Maximum number of side-B positions probed by the zigzag refinement.
    pub max_matching_offset: usize,
    pub mode: Mode,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            alignment_text: String::new(),
            minimum_lines_moved: 0,
            max_matching_offset: DEFAULT_MAX_MATCHING_OFFSET,
            mode: Mode::Release,
        }
    }
}

impl DiffOptions {
    /// Parse options from a JSON object. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> DiffResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: &Path) -> DiffResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| DiffError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn is_debug(&self) -> bool {
        self.mode == Mode::Debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DiffOptions::default();
        assert_eq!(options.minimum_lines_moved, 0);
        assert_eq!(options.max_matching_offset, 500);
        assert_eq!(options.mode, Mode::Release);
        assert!(options.alignment_text.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            DiffOptions::from_json_str(r#"{"minimumLinesMoved": 2, "mode": "debug"}"#)
                .expect("valid options");
        assert_eq!(options.minimum_lines_moved, 2);
        assert!(options.is_debug());
        assert_eq!(options.max_matching_offset, 500);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = DiffOptions::from_json_str("{\"mode\": \"loud\"}").expect_err("bad mode");
        assert!(matches!(err, DiffError::Json(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DiffOptions::from_json_file(Path::new("/nonexistent/options.json"))
            .expect_err("missing file");
        assert!(matches!(err, DiffError::Io { .. }));
    }
}
