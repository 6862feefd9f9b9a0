//! The diff engine: main matching loop, change bookkeeping and output.
//!
//! ```text
//! RawToken lists ─▶ TokenStream (A) ─┐
//!                   TokenStream (B) ─┤
//!                                    ▼
//!                DiffDriver ── SequenceMatcher::best_run
//!                    │      └─ BracketVerifier
//!                    ▼
//!                ChangeSet::finish ─▶ Aligner ─▶ Diff
//! ```
//!
//! The driver walks side A in order. For every still-unmatched anchor it asks
//! the matcher for the best equal run on side B and commits it as a move,
//! or reports the anchor as deleted. Leftover side-B tokens are additions.
//! The aligner then decides which moves render as unchanged text.

pub mod align;
pub mod brackets;
pub mod changes;
pub mod matcher;

use serde::Serialize;
use tracing::{debug, info};

pub use align::{
    Aligner, Alignment, AlignmentTable, MoveResolution, OffsetEntry, OffsetKind, OffsetTracker,
};
pub use brackets::BracketVerifier;
pub use changes::{Change, ChangeKind, ChangeSet, compact_changes};
pub use matcher::{Run, SequenceMatcher};

use crate::config::DiffOptions;
use crate::error::{DiffError, DiffResult};
use crate::token::{Classification, RawToken, Side, Token, TokenStream};

/// Mutable state of one diff computation.
///
/// Owns both arenas, the accumulated changes and the match serial. The
/// serial is local to the computation, so concurrent diffs never share
/// numbering.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub a: TokenStream,
    pub b: TokenStream,
    pub changes: ChangeSet,
    serial: u32,
}

impl EngineState {
    pub fn new(a: TokenStream, b: TokenStream) -> Self {
        Self {
            a,
            b,
            changes: ChangeSet::new(),
            serial: 0,
        }
    }

    pub const fn stream(&self, side: Side) -> &TokenStream {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    const fn stream_mut(&mut self, side: Side) -> &mut TokenStream {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    const fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }

    /// Report one token as deleted (side A) or added (side B).
    pub fn report_edit(&mut self, side: Side, index: usize) -> DiffResult<()> {
        let group = self.next_serial();
        let classification = match side {
            Side::A => Classification::Deleted,
            Side::B => Classification::Added,
        };
        self.stream_mut(side).mark(index, classification, group)?;

        let token = self.token(side, index)?;
        let change = match side {
            Side::A => Change::deletion(token, group),
            Side::B => Change::addition(token, group),
        };
        self.changes.push_edit(change)
    }

    /// Commit `a..a+len` / `b..b+len` as one move and return its position
    /// in the move list. Bracket partners are left to the caller.
    pub fn commit_move(&mut self, a: usize, b: usize, len: usize) -> DiffResult<usize> {
        for k in 0..len {
            match (self.a.peek(a + k), self.b.peek(b + k)) {
                (Some(x), Some(y)) if x.same_content(y) => {}
                _ => {
                    return Err(DiffError::invariant(
                        "committed run is not pairwise equal and unmatched",
                        format!("a[{}] / b[{}]", a + k, b + k),
                    ));
                }
            }
        }

        let group = self.next_serial();
        for k in 0..len {
            self.a.mark(a + k, Classification::Moved, group)?;
            self.b.mark(b + k, Classification::Moved, group)?;
        }

        let tokens_a: Vec<&Token> = self.a.tokens()[a..a + len].iter().collect();
        let tokens_b: Vec<&Token> = self.b.tokens()[b..b + len].iter().collect();
        let change = Change::moved(&tokens_a, &tokens_b, group)?;
        self.changes.push_move(change)
    }

    fn token(&self, side: Side, index: usize) -> DiffResult<&Token> {
        self.stream(side)
            .get(index)
            .ok_or_else(|| {
                DiffError::invariant("token index out of range", format!("{side}[{index}]"))
            })
    }
}

/// Runs the main matching loop over two token streams.
pub struct DiffDriver {
    state: EngineState,
    options: DiffOptions,
}

impl DiffDriver {
    pub fn new(
        tokens_a: Vec<RawToken>,
        tokens_b: Vec<RawToken>,
        options: DiffOptions,
    ) -> DiffResult<Self> {
        let debug = options.is_debug();
        let prepare = |mut raw: Vec<RawToken>| {
            if !debug {
                for token in &mut raw {
                    token.label = None;
                }
            }
            raw
        };
        let a = TokenStream::new(Side::A, prepare(tokens_a))?;
        let b = TokenStream::new(Side::B, prepare(tokens_b))?;
        Ok(Self {
            state: EngineState::new(a, b),
            options,
        })
    }

    /// Classify every token and resolve how each move renders.
    pub fn run(mut self) -> DiffResult<Diff> {
        info!(
            tokens_a = self.state.a.len(),
            tokens_b = self.state.b.len(),
            "computing diff"
        );

        // A refined run may not cover its anchor, so rescan from the anchor.
        // Each pass classifies at least one token.
        let mut cursor = 0;
        while let Some(anchor) = self.state.a.next(cursor).map(|t| t.index) {
            self.process_anchor(anchor)?;
            cursor = anchor;
        }

        let mut cursor = 0;
        while let Some(index) = self.state.b.next(cursor).map(|t| t.index) {
            self.state.report_edit(Side::B, index)?;
            cursor = index + 1;
        }

        let EngineState { a, b, changes, .. } = self.state;
        let (edits, moves) = changes.finish(&a, &b)?;
        let alignment = Aligner::new(&a, &b, &edits, &moves, &self.options).run()?;

        let diff = Diff::assemble(edits, moves, alignment, a, b);
        let summary = diff.summary();
        info!(
            additions = summary.additions,
            deletions = summary.deletions,
            moves = summary.moves,
            "diff computed"
        );
        Ok(diff)
    }

    fn process_anchor(&mut self, anchor: usize) -> DiffResult<()> {
        let matcher = SequenceMatcher::new(
            &self.state.a,
            &self.state.b,
            self.options.max_matching_offset,
        );
        let Some(run) = matcher.best_run(anchor)? else {
            debug!(anchor, "no candidate on side b");
            self.state.report_edit(Side::A, anchor)?;
            return BracketVerifier::verify_single(&mut self.state, Side::A, anchor);
        };

        let alone = self.state.a.get(run.a).is_some_and(|t| t.can_match_alone);
        if run.len == 1 && !alone {
            debug!(a = run.a, b = run.b, "lone structural token not matched");
            self.state.report_edit(Side::A, run.a)?;
            BracketVerifier::verify_single(&mut self.state, Side::A, run.a)?;
            if self.state.b.peek(run.b).is_some() {
                self.state.report_edit(Side::B, run.b)?;
                BracketVerifier::verify_single(&mut self.state, Side::B, run.b)?;
            }
            return Ok(());
        }

        self.commit_run(run)
    }

    fn commit_run(&mut self, run: Run) -> DiffResult<()> {
        debug!(a = run.a, b = run.b, len = run.len, "committing run");
        let parent = self.state.commit_move(run.a, run.b, run.len)?;

        let mut verifier = BracketVerifier::new();
        for k in 0..run.len {
            if let Some(token) = self.state.a.get(run.a + k) {
                verifier.track(token, Some(run.b + k));
            }
        }
        if verifier.is_balanced() {
            return Ok(());
        }
        verifier.verify(ChangeKind::Move, &mut self.state, Some(parent))
    }
}

/// A committed move together with how the aligner resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRun {
    #[serde(flatten)]
    pub change: Change,
    pub resolution: MoveResolution,
}

/// Counts over the reported changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub additions: usize,
    pub deletions: usize,
    pub moves: usize,
    pub added_tokens: usize,
    pub deleted_tokens: usize,
    pub moved_tokens: usize,
}

/// Result of one diff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Reported changes: deletions, then additions, then moves that render
    /// as moves, each group by first index.
    pub changes: Vec<Change>,
    /// Every committed run with its resolution, in commit order.
    pub matches: Vec<MatchedRun>,
    pub alignment: AlignmentTable,
    pub tokens_a: Vec<Token>,
    pub tokens_b: Vec<Token>,
}

impl Diff {
    fn assemble(
        edits: Vec<Change>,
        moves: Vec<Change>,
        alignment: Alignment,
        a: TokenStream,
        b: TokenStream,
    ) -> Self {
        let mut reported: Vec<Change> = moves
            .iter()
            .zip(&alignment.resolutions)
            .filter(|(_, r)| r.is_reported())
            .map(|(m, _)| m.clone())
            .collect();
        reported.sort_by_key(|m| m.first_index(Side::A));

        let matches = moves
            .into_iter()
            .zip(alignment.resolutions)
            .map(|(change, resolution)| MatchedRun { change, resolution })
            .collect();

        let mut changes = edits;
        changes.extend(reported);

        Self {
            changes,
            matches,
            alignment: alignment.table,
            tokens_a: a.into_tokens(),
            tokens_b: b.into_tokens(),
        }
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in &self.changes {
            match change.kind {
                ChangeKind::Addition => {
                    summary.additions += 1;
                    summary.added_tokens += change.len();
                }
                ChangeKind::Deletion => {
                    summary.deletions += 1;
                    summary.deleted_tokens += change.len();
                }
                ChangeKind::Move => {
                    summary.moves += 1;
                    summary.moved_tokens += change.len();
                }
            }
        }
        summary
    }

    /// Reported changes of one kind.
    pub fn changes_of(&self, kind: ChangeKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }

    pub fn tokens(&self, side: Side) -> &[Token] {
        match side {
            Side::A => &self.tokens_a,
            Side::B => &self.tokens_b,
        }
    }
}

/// Diff two tokenized sources.
pub fn compute_diff(
    tokens_a: Vec<RawToken>,
    tokens_b: Vec<RawToken>,
    options: &DiffOptions,
) -> DiffResult<Diff> {
    DiffDriver::new(tokens_a, tokens_b, options.clone())?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::testing::raw;

    fn diff(a: &str, b: &str) -> Diff {
        compute_diff(raw(a), raw(b), &DiffOptions::default()).expect("diff")
    }

    #[test]
    fn test_identical_inputs_have_no_changes() {
        let d = diff("f ( x ) ;\ng ( )", "f ( x ) ;\ng ( )");
        assert!(d.changes.is_empty());
        assert!(d.alignment.is_empty());
        assert!(d.matches.iter().all(|m| m.resolution != MoveResolution::Reported));
    }

    #[test]
    fn test_every_token_is_classified() {
        let d = diff("a ( b ) c", "c ( b ) d");
        for token in d.tokens_a.iter().chain(&d.tokens_b) {
            assert!(token.is_matched(), "{}", token.describe());
            assert_ne!(token.state.classification, Classification::Unmatched);
        }
    }

    #[test]
    fn test_lone_punctuation_is_not_matched() {
        let d = diff("x ;", "y ;");
        assert_eq!(d.summary().deletions, 1);
        assert_eq!(d.summary().additions, 1);
        assert_eq!(d.summary().deleted_tokens, 2);
        assert!(d.matches.is_empty());
    }

    #[test]
    fn test_closing_bracket_follows_parent_move() {
        let d = diff("f ( x )", "f ( y )");
        let parent = d
            .matches
            .iter()
            .find(|m| m.change.indices_a == vec![0, 1])
            .expect("parent run");
        assert_eq!(parent.change.closing_moves.len(), 1);
        let child = &d.matches[parent.change.closing_moves[0]];
        assert_eq!(child.change.indices_a, vec![3]);
        assert_eq!(child.resolution, MoveResolution::Skipped);
    }

    #[test]
    fn test_insertion_above_is_aligned() {
        let d = diff("x\ny", "z\nx\ny");
        assert_eq!(d.summary().additions, 1);
        assert_eq!(d.summary().moves, 0);
        assert_eq!(d.alignment.a.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(d.alignment.b.is_empty());
    }

    #[test]
    fn test_match_groups_pair_moved_tokens() {
        let d = diff("p q", "p q");
        let a = d.tokens_a[0].state.match_group;
        assert!(a.is_some());
        assert_eq!(a, d.tokens_b[0].state.match_group);
    }

    #[test]
    fn test_release_mode_drops_labels() {
        let mut tokens = raw("x");
        tokens[0].label = Some("identifier".to_owned());
        let d = compute_diff(tokens.clone(), tokens.clone(), &DiffOptions::default())
            .expect("diff");
        assert_eq!(d.tokens_a[0].label, None);

        let options = DiffOptions {
            mode: crate::config::Mode::Debug,
            ..DiffOptions::default()
        };
        let d = compute_diff(tokens.clone(), tokens, &options).expect("diff");
        assert_eq!(d.tokens_a[0].label.as_deref(), Some("identifier"));
    }

    #[test]
    fn test_anchor_left_by_zigzag_is_revisited() {
        let d = diff("( ) q log ( ) ; done", "log ( ) ; done");
        for token in &d.tokens_a {
            assert!(token.is_matched(), "{}", token.describe());
        }
        assert_eq!(d.tokens_a[0].state.classification, Classification::Deleted);
        assert_eq!(d.tokens_a[1].state.classification, Classification::Deleted);
        assert_eq!(d.matches.len(), 1);
        assert_eq!(d.matches[0].change.indices_a, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_backwards_lines_are_an_error_not_a_panic() {
        let mut tokens = raw("x y");
        tokens[0].line_start = 5;
        tokens[0].line_end = 5;
        let err = compute_diff(tokens.clone(), tokens, &DiffOptions::default())
            .expect_err("invalid");
        assert!(matches!(err, DiffError::InvalidToken { side: Side::A, index: 1, .. }));
    }

    #[test]
    fn test_invalid_tokens_are_rejected() {
        let mut tokens = raw("x");
        tokens[0].start = 5;
        tokens[0].end = 1;
        let err = compute_diff(tokens, Vec::new(), &DiffOptions::default()).expect_err("invalid");
        assert!(matches!(err, DiffError::InvalidToken { side: Side::A, .. }));
    }
}
