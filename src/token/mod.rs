//! Token model shared by the lexer and the diff engine.
//!
//! A [`RawToken`] is what a tokenizer hands across the boundary: kind code,
//! text, source range and delimiter metadata. The engine turns each one into
//! a [`Token`] living in a per-side arena ([`stream::TokenStream`]) where it
//! is addressed by its permanent index and carries the mutable match state.

pub mod stream;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use stream::TokenStream;

/// Which of the two compared sources a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The old source.
    A,
    /// The new source.
    B,
}

impl Side {
    /// The other side.
    pub const fn opposite(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("a"),
            Self::B => f.write_str("b"),
        }
    }
}

/// Coarse token category assigned by the tokenizer (e.g. "identifier").
///
/// Two tokens are only ever equal when both their kind code and their text
/// match; the kind alone is used to bucket candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KindCode(pub u16);

/// Bracket family, the key that groups an opening token with its closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterFamily {
    Paren,
    Brace,
    Bracket,
}

/// Whether a delimiter opens or closes its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterRole {
    Open,
    Close,
}

/// Structural delimiter metadata attached to bracket tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiter {
    pub family: DelimiterFamily,
    pub role: DelimiterRole,
}

impl Delimiter {
    pub const fn open(family: DelimiterFamily) -> Self {
        Self {
            family,
            role: DelimiterRole::Open,
        }
    }

    pub const fn close(family: DelimiterFamily) -> Self {
        Self {
            family,
            role: DelimiterRole::Close,
        }
    }
}

/// Final verdict for a token. Starts as `Unmatched` and is set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Unmatched,
    Added,
    Deleted,
    /// Part of a matched run. Whether the run renders as unchanged, as a
    /// re-alignment or as an explicit move is decided by the aligner.
    Moved,
}

/// A token as produced by a tokenizer, before it enters the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToken {
    pub kind: KindCode,
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 0-based line of the first character.
    pub line_start: usize,
    /// 0-based line of the last character.
    pub line_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<Delimiter>,
    /// Punctuation and delimiters may not form a 1-token match on their own.
    #[serde(default)]
    pub can_match_alone: bool,
    /// Human readable kind label, only kept in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Mutable match state of one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub matched: bool,
    /// Serial shared by every token committed by the same change, on both
    /// sides, so a move can be labeled identically for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_group: Option<u32>,
    pub classification: Classification,
}

/// One lexical unit on one side, addressed by its permanent `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub side: Side,
    pub index: usize,
    pub kind: KindCode,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<Delimiter>,
    pub can_match_alone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: MatchState,
}

impl Token {
    pub fn new(side: Side, index: usize, raw: RawToken) -> Self {
        Self {
            side,
            index,
            kind: raw.kind,
            text: raw.text,
            start: raw.start,
            end: raw.end,
            line_start: raw.line_start,
            line_end: raw.line_end,
            delimiter: raw.delimiter,
            can_match_alone: raw.can_match_alone,
            label: raw.label,
            state: MatchState::default(),
        }
    }

    pub const fn is_matched(&self) -> bool {
        self.state.matched
    }

    pub fn is_opening(&self) -> bool {
        self.delimiter.is_some_and(|d| d.role == DelimiterRole::Open)
    }

    pub fn is_closing(&self) -> bool {
        self.delimiter.is_some_and(|d| d.role == DelimiterRole::Close)
    }

    pub fn family(&self) -> Option<DelimiterFamily> {
        self.delimiter.map(|d| d.family)
    }

    /// Diff equality: same kind code and same literal text.
    pub fn same_content(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }

    /// Short description used in error context and logs.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{}[{}] {label} `{}`", self.side, self.index, self.text),
            None => format!("{}[{}] kind {} `{}`", self.side, self.index, self.kind.0, self.text),
        }
    }
}
