//! Change records and compaction of adjacent additions/deletions.

use serde::Serialize;
use tracing::debug;

use crate::error::{DiffError, DiffResult};
use crate::token::{Side, Token, TokenStream};

/// What a change reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Tokens only present on side B.
    Addition,
    /// Tokens only present on side A.
    Deletion,
    /// The same token run present on both sides.
    Move,
}

impl ChangeKind {
    /// Side whose indices a change of this kind is ordered by.
    pub const fn primary_side(self) -> Side {
        match self {
            Self::Addition => Side::B,
            Self::Deletion | Self::Move => Side::A,
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Deletion => 0,
            Self::Addition => 1,
            Self::Move => 2,
        }
    }
}

/// One typed change. For moves `indices_a[i]` pairs with `indices_b[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub kind: ChangeKind,
    pub indices_a: Vec<usize>,
    pub indices_b: Vec<usize>,
    /// Total text length of the covered tokens (one side).
    pub weight: usize,
    /// Newlines spanned on the primary side.
    pub newline_count: usize,
    /// Match serial shared with the tokens this change committed.
    pub match_group: u32,
    /// Moves of closing brackets whose opener lives in this move.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub closing_moves: Vec<usize>,
}

impl Change {
    pub fn addition(token: &Token, match_group: u32) -> Self {
        Self::single(ChangeKind::Addition, token, match_group)
    }

    pub fn deletion(token: &Token, match_group: u32) -> Self {
        Self::single(ChangeKind::Deletion, token, match_group)
    }

    fn single(kind: ChangeKind, token: &Token, match_group: u32) -> Self {
        let (indices_a, indices_b) = match kind {
            ChangeKind::Addition => (Vec::new(), vec![token.index]),
            _ => (vec![token.index], Vec::new()),
        };
        Self {
            kind,
            indices_a,
            indices_b,
            weight: token.text.chars().count(),
            newline_count: token.line_end - token.line_start,
            match_group,
            closing_moves: Vec::new(),
        }
    }

    /// Move covering the pairwise equal runs `tokens_a` / `tokens_b`.
    pub fn moved(tokens_a: &[&Token], tokens_b: &[&Token], match_group: u32) -> DiffResult<Self> {
        if tokens_a.len() != tokens_b.len() || tokens_a.is_empty() {
            return Err(DiffError::invariant(
                "move sides differ in length",
                format!("{} vs {} tokens", tokens_a.len(), tokens_b.len()),
            ));
        }
        let newline_count = match (tokens_a.first(), tokens_a.last()) {
            (Some(first), Some(last)) => last.line_end - first.line_start,
            _ => 0,
        };
        Ok(Self {
            kind: ChangeKind::Move,
            indices_a: tokens_a.iter().map(|t| t.index).collect(),
            indices_b: tokens_b.iter().map(|t| t.index).collect(),
            weight: tokens_a.iter().map(|t| t.text.chars().count()).sum(),
            newline_count,
            match_group,
            closing_moves: Vec::new(),
        })
    }

    pub fn indices(&self, side: Side) -> &[usize] {
        match side {
            Side::A => &self.indices_a,
            Side::B => &self.indices_b,
        }
    }

    pub fn first_index(&self, side: Side) -> Option<usize> {
        self.indices(side).first().copied()
    }

    pub fn last_index(&self, side: Side) -> Option<usize> {
        self.indices(side).last().copied()
    }

    /// Number of tokens covered on one side.
    pub fn len(&self) -> usize {
        self.indices(self.kind.primary_side()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn primary_range(&self) -> DiffResult<(usize, usize)> {
        let side = self.kind.primary_side();
        match (self.first_index(side), self.last_index(side)) {
            (Some(first), Some(last)) => Ok((first, last)),
            _ => Err(DiffError::invariant(
                "change without indices",
                format!("{:?} group {}", self.kind, self.match_group),
            )),
        }
    }

    fn absorb(&mut self, next: Self, stream: &TokenStream) {
        self.indices_a.extend(next.indices_a);
        self.indices_b.extend(next.indices_b);
        self.weight += next.weight;

        let side = self.kind.primary_side();
        let first = self.first_index(side).and_then(|i| stream.get(i));
        let last = self.last_index(side).and_then(|i| stream.get(i));
        if let (Some(first), Some(last)) = (first, last) {
            self.newline_count = last.line_end - first.line_start;
        }
    }
}

/// Changes accumulated by the main loop.
#[derive(Debug, Default)]
pub struct ChangeSet {
    edits: Vec<Change>,
    moves: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an addition or deletion.
    pub fn push_edit(&mut self, change: Change) -> DiffResult<()> {
        if change.kind == ChangeKind::Move {
            return Err(DiffError::invariant(
                "move recorded as an edit",
                format!("group {}", change.match_group),
            ));
        }
        self.edits.push(change);
        Ok(())
    }

    /// Record a move and return its position in the move list.
    pub fn push_move(&mut self, change: Change) -> DiffResult<usize> {
        if change.kind != ChangeKind::Move {
            return Err(DiffError::invariant(
                "edit recorded as a move",
                format!("{:?} group {}", change.kind, change.match_group),
            ));
        }
        self.moves.push(change);
        Ok(self.moves.len() - 1)
    }

    /// Tie a closing-bracket move to the move holding its opener.
    pub fn add_closing_move(&mut self, parent: usize, child: usize) -> DiffResult<()> {
        let moves = self.moves.len();
        let Some(change) = self.moves.get_mut(parent) else {
            return Err(DiffError::invariant(
                "closing move for a missing parent",
                format!("parent {parent}, child {child}, {moves} moves"),
            ));
        };
        change.closing_moves.push(child);
        Ok(())
    }

    pub fn edits(&self) -> &[Change] {
        &self.edits
    }

    pub fn moves(&self) -> &[Change] {
        &self.moves
    }

    /// Compact the edits and hand back `(edits, moves)`.
    pub fn finish(
        self,
        a: &TokenStream,
        b: &TokenStream,
    ) -> DiffResult<(Vec<Change>, Vec<Change>)> {
        let raw = self.edits.len();
        let edits = compact_changes(self.edits, a, b)?;
        debug!(raw, compacted = edits.len(), moves = self.moves.len(), "changes compacted");
        Ok((edits, self.moves))
    }
}

/// Merge same-kind additions/deletions whose index ranges touch.
///
/// Changes are sorted by kind, then by first index; moves pass through
/// untouched. Overlapping ranges of the same kind mean an index was
/// reported twice and fail as an invariant violation.
pub fn compact_changes(
    mut changes: Vec<Change>,
    a: &TokenStream,
    b: &TokenStream,
) -> DiffResult<Vec<Change>> {
    for change in &changes {
        change.primary_range()?;
    }
    changes.sort_by_key(|c| {
        (
            c.kind.rank(),
            c.first_index(c.kind.primary_side()).unwrap_or_default(),
        )
    });

    let mut compacted: Vec<Change> = Vec::with_capacity(changes.len());
    let mut iter = changes.into_iter().peekable();

    while let Some(mut current) = iter.next() {
        if current.kind == ChangeKind::Move {
            compacted.push(current);
            continue;
        }
        let stream = match current.kind.primary_side() {
            Side::A => a,
            Side::B => b,
        };

        while let Some(next) = iter.peek() {
            if next.kind != current.kind {
                break;
            }
            let (_, last) = current.primary_range()?;
            let (first, _) = next.primary_range()?;
            if first <= last {
                return Err(DiffError::invariant(
                    "index reported by two changes",
                    format!("{:?} at {} index {first}", current.kind, current.kind.primary_side()),
                ));
            }
            if last + 1 != first {
                break;
            }
            if let Some(next) = iter.next() {
                current.absorb(next, stream);
            }
        }

        compacted.push(current);
    }

    Ok(compacted)
}
