//! Offset tracking, move resolution and the final line alignment table.
//!
//! Both sides are laid on a shared virtual token axis. Every deleted token
//! leaves a placeholder slot on side B and every added token one on side A,
//! so a run whose first tokens land on the same virtual position reads as
//! unchanged. For the other runs, heaviest first:
//!
//! - equal offsetted indices: the run is in place,
//! - otherwise, when no other move sits between the two positions on the
//!   lagging side, placeholder slots are inserted to re-align it,
//! - otherwise it is reported as an explicit move.
//!
//! Once every run is resolved the line table is built in one positional
//! sweep over the runs that render side by side.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use super::changes::{Change, ChangeKind};
use crate::config::DiffOptions;
use crate::error::{DiffError, DiffResult};
use crate::token::{Side, Token, TokenStream};

/// What an offset entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OffsetKind {
    /// Slot left by a token added on the other side.
    Addition,
    /// Slot left by a token deleted on the other side.
    Deletion,
    /// Marker at the first index of a committed move. Takes no slot.
    Move,
    /// Slot inserted to re-align a move.
    MoveAlignment,
}

impl OffsetKind {
    const fn shifts(self) -> bool {
        !matches!(self, Self::Move)
    }

    const fn is_move(self) -> bool {
        matches!(self, Self::Move | Self::MoveAlignment)
    }
}

/// One entry of a side's offset table, keyed by the raw index it precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetEntry {
    pub index: usize,
    pub kind: OffsetKind,
    pub newline_count: usize,
    /// Position of the owning change in the edit list (additions and
    /// deletions) or in the move list (moves and move alignments).
    pub owner: usize,
}

/// Ordered offset tables of both sides.
#[derive(Debug, Clone, Default)]
pub struct OffsetTracker {
    a: BTreeMap<usize, Vec<OffsetEntry>>,
    b: BTreeMap<usize, Vec<OffsetEntry>>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, side: Side) -> &BTreeMap<usize, Vec<OffsetEntry>> {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn record(&mut self, side: Side, entry: OffsetEntry) {
        let table = match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        };
        table.entry(entry.index).or_default().push(entry);
    }

    pub fn entries(&self, side: Side) -> impl Iterator<Item = &OffsetEntry> {
        self.table(side).values().flatten()
    }

    /// Virtual position of the raw index `target` on `side`.
    ///
    /// Every slot-taking entry keyed at or before `target` pushes it one
    /// further. Keys are raw indices, so entries stacked inside an earlier
    /// block are already counted by the time `target` is reached.
    pub fn get_offset(&self, side: Side, target: usize) -> usize {
        let mut offsetted = target;
        for entry in self.table(side).range(..=target).flat_map(|(_, v)| v) {
            if entry.kind.shifts() {
                offsetted += 1;
            }
        }
        offsetted
    }

    /// Whether slots can be inserted on `side` between the virtual
    /// positions `lower` and `upper` without sliding past another move.
    ///
    /// `excluded` lists the move being aligned and its closing moves.
    pub fn move_can_get_aligned(
        &self,
        side: Side,
        lower: usize,
        upper: usize,
        excluded: &[usize],
    ) -> bool {
        self.entries(side)
            .filter(|e| e.kind.is_move() && !excluded.contains(&e.owner))
            .all(|e| {
                let position = self.get_offset(side, e.index);
                position <= lower || position > upper
            })
    }
}

/// How the aligner decided to display a committed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveResolution {
    /// Both sides already line up: unchanged text.
    InPlace,
    /// Lined up by inserting placeholder rows.
    Aligned,
    /// Rendered as an explicit move.
    Reported,
    /// Closing-bracket move following its in-place or aligned parent.
    Skipped,
    /// Would be reported, but spans fewer lines than `minimum_lines_moved`.
    Suppressed,
}

impl MoveResolution {
    pub const fn is_reported(self) -> bool {
        matches!(self, Self::Reported)
    }
}

/// Per side, the rendered rows that hold a placeholder line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlignmentTable {
    pub a: BTreeSet<usize>,
    pub b: BTreeSet<usize>,
}

impl AlignmentTable {
    pub const fn side(&self, side: Side) -> &BTreeSet<usize> {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }

    /// Lines of `source` with `alignment_text` rows spliced in.
    pub fn apply(&self, side: Side, source: &str, alignment_text: &str) -> Vec<String> {
        let placeholders = self.side(side);
        let mut lines = source.lines();
        let total = source.lines().count() + placeholders.len();

        (0..total)
            .filter_map(|row| {
                if placeholders.contains(&row) {
                    Some(alignment_text.to_owned())
                } else {
                    lines.next().map(str::to_owned)
                }
            })
            .collect()
    }
}

/// Placeholder line counts keyed by the source line they are inserted before.
#[derive(Debug, Default)]
struct LinePlaceholders {
    a: BTreeMap<usize, usize>,
    b: BTreeMap<usize, usize>,
}

impl LinePlaceholders {
    fn side(&self, side: Side) -> &BTreeMap<usize, usize> {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    fn insert(&mut self, side: Side, before_line: usize, count: usize) {
        let map = match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        };
        *map.entry(before_line).or_default() += count;
    }

    /// Rendered row of source `line` on `side`.
    fn rendered(&self, side: Side, line: usize) -> usize {
        line + self.side(side).range(..=line).map(|(_, c)| c).sum::<usize>()
    }

    fn rendered_total(&self, side: Side, line_count: usize) -> usize {
        line_count + self.side(side).values().sum::<usize>()
    }

    fn into_table(self) -> AlignmentTable {
        fn rows(map: &BTreeMap<usize, usize>) -> BTreeSet<usize> {
            let mut rows = BTreeSet::new();
            let mut inserted = 0;
            for (&line, &count) in map {
                let start = line + inserted;
                rows.extend(start..start + count);
                inserted += count;
            }
            rows
        }
        AlignmentTable {
            a: rows(&self.a),
            b: rows(&self.b),
        }
    }
}

/// Everything the aligner decided.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// One resolution per move, parallel to the move list.
    pub resolutions: Vec<MoveResolution>,
    pub table: AlignmentTable,
}

/// Resolves moves against the offset tables and builds the line table.
pub struct Aligner<'s> {
    a: &'s TokenStream,
    b: &'s TokenStream,
    edits: &'s [Change],
    moves: &'s [Change],
    minimum_lines_moved: usize,
    offsets: OffsetTracker,
}

impl<'s> Aligner<'s> {
    pub fn new(
        a: &'s TokenStream,
        b: &'s TokenStream,
        edits: &'s [Change],
        moves: &'s [Change],
        options: &DiffOptions,
    ) -> Self {
        Self {
            a,
            b,
            edits,
            moves,
            minimum_lines_moved: options.minimum_lines_moved,
            offsets: OffsetTracker::new(),
        }
    }

    pub fn run(mut self) -> DiffResult<Alignment> {
        self.record_edit_offsets()?;
        self.record_move_markers()?;
        let resolutions = self.resolve_moves()?;
        let table = self.build_table(&resolutions)?;
        Ok(Alignment { resolutions, table })
    }

    const fn stream(&self, side: Side) -> &'s TokenStream {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// Additions and deletions leave one slot per token on the other side,
    /// right after the partner of the nearest preceding matched token.
    fn record_edit_offsets(&mut self) -> DiffResult<()> {
        let mut partner_a = vec![None; self.a.len()];
        let mut partner_b = vec![None; self.b.len()];
        for change in self.moves {
            for (&ia, &ib) in change.indices_a.iter().zip(&change.indices_b) {
                if let (Some(pa), Some(pb)) = (partner_a.get_mut(ia), partner_b.get_mut(ib)) {
                    *pa = Some(ib);
                    *pb = Some(ia);
                }
            }
        }

        for (owner, change) in self.edits.iter().enumerate() {
            let (side, kind, partners) = match change.kind {
                ChangeKind::Deletion => (Side::A, OffsetKind::Deletion, &partner_a),
                ChangeKind::Addition => (Side::B, OffsetKind::Addition, &partner_b),
                ChangeKind::Move => {
                    return Err(DiffError::invariant(
                        "move in the edit list",
                        format!("edit {owner}"),
                    ));
                }
            };
            let first = change.first_index(side).ok_or_else(|| {
                DiffError::invariant("edit without indices", format!("edit {owner}"))
            })?;
            let key = partners[..first.min(partners.len())]
                .iter()
                .rev()
                .find_map(|p| *p)
                .map_or(0, |p| p + 1);

            for _ in change.indices(side) {
                self.offsets.record(
                    side.opposite(),
                    OffsetEntry {
                        index: key,
                        kind,
                        newline_count: change.newline_count,
                        owner,
                    },
                );
            }
        }
        Ok(())
    }

    fn record_move_markers(&mut self) -> DiffResult<()> {
        for (owner, change) in self.moves.iter().enumerate() {
            for side in [Side::A, Side::B] {
                let index = first_index(change, side, owner)?;
                self.offsets.record(
                    side,
                    OffsetEntry {
                        index,
                        kind: OffsetKind::Move,
                        newline_count: change.newline_count,
                        owner,
                    },
                );
            }
        }
        Ok(())
    }

    fn resolve_moves(&mut self) -> DiffResult<Vec<MoveResolution>> {
        let mut order: Vec<usize> = (0..self.moves.len()).collect();
        order.sort_by(|&x, &y| self.moves[y].weight.cmp(&self.moves[x].weight));

        let mut resolved: Vec<Option<MoveResolution>> = vec![None; self.moves.len()];
        for id in order {
            if resolved[id].is_some() {
                continue;
            }
            let change = &self.moves[id];
            let first_a = first_index(change, Side::A, id)?;
            let first_b = first_index(change, Side::B, id)?;
            let offsetted_a = self.offsets.get_offset(Side::A, first_a);
            let offsetted_b = self.offsets.get_offset(Side::B, first_b);

            let resolution = if offsetted_a == offsetted_b {
                MoveResolution::InPlace
            } else {
                let (side, first, lower, upper) = if offsetted_a < offsetted_b {
                    (Side::A, first_a, offsetted_a, offsetted_b)
                } else {
                    (Side::B, first_b, offsetted_b, offsetted_a)
                };
                let mut excluded = change.closing_moves.clone();
                excluded.push(id);

                if self.offsets.move_can_get_aligned(side, lower, upper, &excluded) {
                    for _ in lower..upper {
                        self.offsets.record(
                            side,
                            OffsetEntry {
                                index: first,
                                kind: OffsetKind::MoveAlignment,
                                newline_count: change.newline_count,
                                owner: id,
                            },
                        );
                    }
                    MoveResolution::Aligned
                } else {
                    MoveResolution::Reported
                }
            };
            debug!(
                id,
                weight = change.weight,
                offsetted_a,
                offsetted_b,
                ?resolution,
                "move resolved"
            );

            resolved[id] = Some(resolution);
            let follow = if resolution.is_reported() {
                MoveResolution::Reported
            } else {
                MoveResolution::Skipped
            };
            for &child in &change.closing_moves {
                if let Some(slot) = resolved.get_mut(child) {
                    slot.get_or_insert(follow);
                }
            }
        }

        Ok(resolved
            .into_iter()
            .zip(self.moves)
            .map(|(resolution, change)| match resolution {
                Some(MoveResolution::Reported)
                    if change.newline_count < self.minimum_lines_moved =>
                {
                    MoveResolution::Suppressed
                }
                Some(resolution) => resolution,
                None => MoveResolution::Reported,
            })
            .collect())
    }

    /// Sweep the side-by-side runs in order, equalizing the rendered row of
    /// each run's first line and of the line after it, then pad the end.
    fn build_table(&self, resolutions: &[MoveResolution]) -> DiffResult<AlignmentTable> {
        let mut runs: Vec<(usize, &Change)> = self
            .moves
            .iter()
            .enumerate()
            .zip(resolutions)
            .filter(|(_, r)| matches!(r, MoveResolution::InPlace | MoveResolution::Aligned))
            .map(|(run, _)| run)
            .collect();
        runs.sort_by_key(|(_, change)| change.first_index(Side::A));

        let mut lines = LinePlaceholders::default();
        for (id, change) in runs {
            let first_a = self.token(Side::A, first_index(change, Side::A, id)?)?;
            let first_b = self.token(Side::B, first_index(change, Side::B, id)?)?;
            let row_a = lines.rendered(Side::A, first_a.line_start);
            let row_b = lines.rendered(Side::B, first_b.line_start);
            if row_a != row_b {
                let (side, token, gap) = if row_a < row_b {
                    (Side::A, first_a, row_b - row_a)
                } else {
                    (Side::B, first_b, row_a - row_b)
                };
                // A run can start mid-line after a run that spilled onto
                // it; the whole line moves down with it.
                lines.insert(side, token.line_start, gap);
            }

            let last_a = self.token(Side::A, last_index(change, Side::A, id)?)?;
            let last_b = self.token(Side::B, last_index(change, Side::B, id)?)?;
            let row_a = lines.rendered(Side::A, last_a.line_end);
            let row_b = lines.rendered(Side::B, last_b.line_end);
            if row_a < row_b {
                lines.insert(Side::A, last_a.line_end + 1, row_b - row_a);
            } else if row_b < row_a {
                lines.insert(Side::B, last_b.line_end + 1, row_a - row_b);
            }
        }

        let total_a = lines.rendered_total(Side::A, self.a.line_count());
        let total_b = lines.rendered_total(Side::B, self.b.line_count());
        if total_a < total_b {
            lines.insert(Side::A, self.a.line_count(), total_b - total_a);
        } else if total_b < total_a {
            lines.insert(Side::B, self.b.line_count(), total_a - total_b);
        }

        Ok(lines.into_table())
    }

    fn token(&self, side: Side, index: usize) -> DiffResult<&'s Token> {
        self.stream(side)
            .get(index)
            .ok_or_else(|| {
                DiffError::invariant("change index out of range", format!("{side}[{index}]"))
            })
    }
}

fn first_index(change: &Change, side: Side, id: usize) -> DiffResult<usize> {
    change
        .first_index(side)
        .ok_or_else(|| DiffError::invariant("move without indices", format!("move {id} on {side}")))
}

fn last_index(change: &Change, side: Side, id: usize) -> DiffResult<usize> {
    change
        .last_index(side)
        .ok_or_else(|| DiffError::invariant("move without indices", format!("move {id} on {side}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::testing::raw;

    fn entry(index: usize, kind: OffsetKind, owner: usize) -> OffsetEntry {
        OffsetEntry {
            index,
            kind,
            newline_count: 0,
            owner,
        }
    }

    #[test]
    fn test_get_offset_counts_entries_at_or_before() {
        let mut offsets = OffsetTracker::new();
        offsets.record(Side::B, entry(0, OffsetKind::Deletion, 0));
        offsets.record(Side::B, entry(0, OffsetKind::Deletion, 0));
        offsets.record(Side::B, entry(3, OffsetKind::Deletion, 1));
        assert_eq!(offsets.get_offset(Side::B, 0), 2);
        assert_eq!(offsets.get_offset(Side::B, 2), 4);
        assert_eq!(offsets.get_offset(Side::B, 3), 6);
        assert_eq!(offsets.get_offset(Side::A, 3), 3);
    }

    #[test]
    fn test_move_markers_take_no_slot() {
        let mut offsets = OffsetTracker::new();
        offsets.record(Side::A, entry(1, OffsetKind::Move, 0));
        assert_eq!(offsets.get_offset(Side::A, 4), 4);
    }

    #[test]
    fn test_move_can_get_aligned_blocks_on_other_moves() {
        let mut offsets = OffsetTracker::new();
        offsets.record(Side::A, entry(0, OffsetKind::Move, 0));
        offsets.record(Side::A, entry(1, OffsetKind::Move, 1));
        offsets.record(Side::A, entry(5, OffsetKind::Move, 2));
        assert!(!offsets.move_can_get_aligned(Side::A, 0, 1, &[0]));
        assert!(offsets.move_can_get_aligned(Side::A, 0, 1, &[0, 1]));
        assert!(offsets.move_can_get_aligned(Side::A, 1, 4, &[1]));
    }

    #[test]
    fn test_edits_are_not_move_typed() {
        let mut offsets = OffsetTracker::new();
        offsets.record(Side::A, entry(1, OffsetKind::Addition, 0));
        assert!(offsets.move_can_get_aligned(Side::A, 0, 5, &[]));
    }

    #[test]
    fn test_table_rows_account_for_earlier_placeholders() {
        let mut lines = LinePlaceholders::default();
        lines.insert(Side::A, 0, 1);
        lines.insert(Side::A, 2, 2);
        assert_eq!(lines.rendered(Side::A, 1), 2);
        assert_eq!(lines.rendered(Side::A, 2), 5);
        let table = lines.into_table();
        assert_eq!(table.a.iter().copied().collect::<Vec<_>>(), vec![0, 3, 4]);
        assert!(table.b.is_empty());
    }

    #[test]
    fn test_apply_splices_placeholders() {
        let table = AlignmentTable {
            a: BTreeSet::from([1, 3]),
            b: BTreeSet::new(),
        };
        assert_eq!(table.apply(Side::A, "x\ny", "~"), vec!["x", "~", "y", "~"]);
        assert_eq!(table.apply(Side::B, "x\ny", "~"), vec!["x", "y"]);
    }

    fn single_move(a: &TokenStream, b: &TokenStream, ia: usize, ib: usize) -> Change {
        Change::moved(
            &[a.get(ia).expect("token")],
            &[b.get(ib).expect("token")],
            1,
        )
        .expect("move")
    }

    #[test]
    fn test_swap_is_reported_both_ways() {
        let a = TokenStream::new(Side::A, raw("a\nb")).expect("valid a");
        let b = TokenStream::new(Side::B, raw("b\na")).expect("valid b");
        let moves = vec![single_move(&a, &b, 0, 1), single_move(&a, &b, 1, 0)];
        let options = DiffOptions::default();
        let alignment = Aligner::new(&a, &b, &[], &moves, &options).run().expect("align");
        assert_eq!(
            alignment.resolutions,
            vec![MoveResolution::Reported, MoveResolution::Reported]
        );
        assert!(alignment.table.is_empty());
    }

    #[test]
    fn test_short_moves_are_suppressed() {
        let a = TokenStream::new(Side::A, raw("a\nb")).expect("valid a");
        let b = TokenStream::new(Side::B, raw("b\na")).expect("valid b");
        let moves = vec![single_move(&a, &b, 0, 1), single_move(&a, &b, 1, 0)];
        let options = DiffOptions {
            minimum_lines_moved: 1,
            ..DiffOptions::default()
        };
        let alignment = Aligner::new(&a, &b, &[], &moves, &options).run().expect("align");
        assert!(alignment
            .resolutions
            .iter()
            .all(|r| *r == MoveResolution::Suppressed));
    }
}
