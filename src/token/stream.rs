//! Per-side token arena with a kind-code candidate index.
//!
//! The kind index only ever holds indices of unmatched tokens: [`TokenStream::mark`]
//! removes the index eagerly, so candidate searches never see a token that
//! has already been classified.

use std::collections::{BTreeSet, HashMap};

use crate::error::{DiffError, DiffResult};
use crate::token::{Classification, DelimiterRole, KindCode, RawToken, Side, Token};

/// Ordered tokens of one side plus the `kind -> unmatched indices` index.
#[derive(Debug, Clone)]
pub struct TokenStream {
    side: Side,
    tokens: Vec<Token>,
    kind_index: HashMap<KindCode, BTreeSet<usize>>,
}

impl TokenStream {
    /// Build the arena for `side`, validating the tokenizer output.
    pub fn new(side: Side, raw: Vec<RawToken>) -> DiffResult<Self> {
        let mut tokens = Vec::with_capacity(raw.len());
        let mut kind_index: HashMap<KindCode, BTreeSet<usize>> = HashMap::new();
        let mut previous_start = 0;
        let mut previous_line = 0;

        for (index, raw_token) in raw.into_iter().enumerate() {
            let invalid = |reason: String| DiffError::InvalidToken {
                side,
                index,
                reason,
            };
            if raw_token.start > raw_token.end {
                return Err(invalid(format!(
                    "start {} is after end {}",
                    raw_token.start, raw_token.end
                )));
            }
            if raw_token.line_start > raw_token.line_end {
                return Err(invalid(format!(
                    "line_start {} is after line_end {}",
                    raw_token.line_start, raw_token.line_end
                )));
            }
            if raw_token.start < previous_start {
                return Err(invalid(format!(
                    "start {} precedes the previous token start {previous_start}",
                    raw_token.start
                )));
            }
            if raw_token.line_start < previous_line {
                return Err(invalid(format!(
                    "line {} precedes the previous token line {previous_line}",
                    raw_token.line_start
                )));
            }
            previous_start = raw_token.start;
            previous_line = raw_token.line_start;

            kind_index.entry(raw_token.kind).or_default().insert(index);
            tokens.push(Token::new(side, index, raw_token));
        }

        Ok(Self {
            side,
            tokens,
            kind_index,
        })
    }

    pub const fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Token at `index` regardless of its match state.
    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// Number of source lines covered by the tokens (last `line_end` + 1).
    pub fn line_count(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.line_end + 1)
    }

    /// First unmatched token at or after `from`.
    pub fn next(&self, from: usize) -> Option<&Token> {
        self.tokens.iter().skip(from).find(|t| !t.is_matched())
    }

    /// Token at `index` if it exists and is still unmatched.
    pub fn peek(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index).filter(|t| !t.is_matched())
    }

    /// Classify the token at `index` and drop it from the candidate index.
    pub fn mark(
        &mut self,
        index: usize,
        classification: Classification,
        match_group: u32,
    ) -> DiffResult<()> {
        let side = self.side;
        let Some(token) = self.tokens.get_mut(index) else {
            return Err(DiffError::invariant(
                "mark on a missing token",
                format!("{side}[{index}], {} tokens", self.tokens.len()),
            ));
        };
        if token.state.matched {
            return Err(DiffError::invariant(
                "token classified twice",
                format!(
                    "{} already {:?}, now {classification:?}",
                    token.describe(),
                    token.state.classification
                ),
            ));
        }
        if classification == Classification::Unmatched {
            return Err(DiffError::invariant(
                "mark without a terminal classification",
                token.describe(),
            ));
        }

        token.state.matched = true;
        token.state.match_group = Some(match_group);
        token.state.classification = classification;

        if let Some(bucket) = self.kind_index.get_mut(&token.kind) {
            bucket.remove(&index);
        }
        Ok(())
    }

    /// Unmatched indices holding a token equal to `target` (kind and text).
    pub fn find(&self, target: &Token) -> Vec<usize> {
        self.kind_index
            .get(&target.kind)
            .map(|bucket| {
                bucket
                    .iter()
                    .copied()
                    .filter(|&i| self.tokens[i].text == target.text)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unmatched start indices where the whole `target` run occurs.
    pub fn find_sequence(&self, target: &[&Token]) -> Vec<usize> {
        let Some((first, rest)) = target.split_first() else {
            return Vec::new();
        };

        self.find(first)
            .into_iter()
            .filter(|&start| {
                rest.iter().enumerate().all(|(offset, expected)| {
                    self.peek(start + offset + 1)
                        .is_some_and(|t| t.same_content(expected))
                })
            })
            .collect()
    }

    /// Structural partner of `open`, scanning forward from `from`.
    ///
    /// Matched and unmatched tokens are both walked so nested pairs of the
    /// same family are skipped correctly. Returns `None` when the stream ends
    /// before the pair closes.
    pub fn find_closing_token(&self, open: &Token, from: usize) -> Option<&Token> {
        let family = open.family().filter(|_| open.is_opening())?;
        let mut depth = 1usize;

        for token in self.tokens.iter().skip(from) {
            let Some(delimiter) = token.delimiter.filter(|d| d.family == family) else {
                continue;
            };
            match delimiter.role {
                DelimiterRole::Open => depth += 1,
                DelimiterRole::Close => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(token);
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::testing::raw;

    fn stream(source: &str) -> TokenStream {
        TokenStream::new(Side::A, raw(source)).expect("valid tokens")
    }

    #[test]
    fn test_next_skips_matched() {
        let mut s = stream("a b c");
        s.mark(0, Classification::Deleted, 1).expect("mark");
        assert_eq!(s.next(0).map(|t| t.index), Some(1));
        s.mark(1, Classification::Deleted, 2).expect("mark");
        s.mark(2, Classification::Deleted, 3).expect("mark");
        assert!(s.next(0).is_none());
    }

    #[test]
    fn test_peek_hides_matched() {
        let mut s = stream("a b");
        assert!(s.peek(1).is_some());
        s.mark(1, Classification::Moved, 1).expect("mark");
        assert!(s.peek(1).is_none());
        assert!(s.get(1).is_some());
        assert!(s.peek(5).is_none());
    }

    #[test]
    fn test_find_requires_equal_text() {
        let s = stream("foo bar foo");
        let target = s.get(0).expect("token").clone();
        assert_eq!(s.find(&target), vec![0, 2]);
    }

    #[test]
    fn test_mark_removes_from_kind_index() {
        let mut s = stream("foo bar foo");
        let target = s.get(0).expect("token").clone();
        s.mark(2, Classification::Moved, 7).expect("mark");
        assert_eq!(s.find(&target), vec![0]);
        assert_eq!(s.get(2).expect("token").state.match_group, Some(7));
    }

    #[test]
    fn test_mark_twice_is_invariant_violation() {
        let mut s = stream("foo");
        s.mark(0, Classification::Deleted, 1).expect("mark");
        let err = s.mark(0, Classification::Moved, 2).expect_err("second mark");
        assert!(matches!(err, DiffError::InvariantViolation { .. }));
    }

    #[test]
    fn test_find_sequence_checks_whole_run() {
        let s = stream("a b c a b d a b c");
        let other = stream("a b c");
        let probe: Vec<&Token> = other.tokens().iter().collect();
        assert_eq!(s.find_sequence(&probe), vec![0, 6]);
    }

    #[test]
    fn test_find_sequence_stops_at_matched_tokens() {
        let mut s = stream("a b c");
        s.mark(1, Classification::Moved, 1).expect("mark");
        let other = stream("a b");
        let probe: Vec<&Token> = other.tokens().iter().collect();
        assert!(s.find_sequence(&probe).is_empty());
    }

    #[test]
    fn test_find_closing_token_skips_nested_pairs() {
        let s = stream("( a ( b ) c ) d )");
        let open = s.get(0).expect("token");
        let close = s.find_closing_token(open, 1).expect("partner");
        assert_eq!(close.index, 6);
    }

    #[test]
    fn test_find_closing_token_ignores_other_families() {
        let s = stream("{ ( } )");
        let open = s.get(1).expect("token");
        assert_eq!(s.find_closing_token(open, 2).map(|t| t.index), Some(3));
    }

    #[test]
    fn test_find_closing_token_truncated_input() {
        let s = stream("{ x ( y )");
        let open = s.get(0).expect("token");
        assert!(s.find_closing_token(open, 1).is_none());
    }

    #[test]
    fn test_rejects_out_of_order_tokens() {
        let mut tokens = raw("a b");
        tokens[1].start = 0;
        tokens[0].start = 5;
        tokens[0].end = 6;
        let err = TokenStream::new(Side::B, tokens).expect_err("out of order");
        assert!(matches!(err, DiffError::InvalidToken { index: 1, side: Side::B, .. }));
    }

    #[test]
    fn test_rejects_lines_going_backwards() {
        let mut tokens = raw("x y");
        tokens[0].line_start = 5;
        tokens[0].line_end = 5;
        let err = TokenStream::new(Side::A, tokens).expect_err("lines out of order");
        assert!(matches!(err, DiffError::InvalidToken { index: 1, side: Side::A, .. }));
    }

    #[test]
    fn test_line_count() {
        assert_eq!(stream("a\nb\nc").line_count(), 3);
        assert_eq!(stream("").line_count(), 0);
    }
}
