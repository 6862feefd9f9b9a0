//! `oa-tokendiff` — token-level structural diff with move detection.
//!
//! Compares two token sequences instead of two line lists. Every token ends
//! up added, deleted or part of a matched run; matched runs are then
//! resolved against each other so that unchanged text lines up side by side
//! and only genuinely relocated code is reported as a move.
//!
//! # Modules
//!
//! - `token` — token model and the per-side arena
//! - `lexer` — built-in regex tokenizer for C-family sources
//! - `engine` — matching loop, bracket consistency, compaction, alignment
//! - `config` — [`DiffOptions`] loaded from JSON or built in code
//!
//! # Architecture
//!
//! ```text
//! source A ─▶ lexer ─┐
//!                    ├─▶ engine::compute_diff ─▶ Diff { changes, matches, alignment }
//! source B ─▶ lexer ─┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod token;

pub use config::{DiffOptions, Mode};
pub use engine::{
    AlignmentTable, Change, ChangeKind, Diff, DiffSummary, MoveResolution, compute_diff,
};
pub use error::{DiffError, DiffResult};
pub use token::{RawToken, Side, Token};

/// Tokenize both sources with the built-in lexer and diff them.
pub fn diff_sources(a: &str, b: &str, options: &DiffOptions) -> DiffResult<Diff> {
    let tokens_a = lexer::tokenize(a, options.mode);
    let tokens_b = lexer::tokenize(b, options.mode);
    tracing::debug!(
        tokens_a = tokens_a.len(),
        tokens_b = tokens_b.len(),
        "sources tokenized"
    );
    compute_diff(tokens_a, tokens_b, options)
}
