//! Keeps paired delimiters in consistent changes.
//!
//! While a change is committed every token of it is tracked. An opening
//! delimiter whose closer is not part of the same change is left on its
//! family stack; [`BracketVerifier::verify`] then finds the structural
//! partner and reports it with the same change type, so `(` never ends up
//! moved while its `)` is reported as deleted.
//!
//! Unbalanced input is not an error. When a move's partner exists on only
//! one side the partner degrades to a plain addition or deletion.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::EngineState;
use super::changes::ChangeKind;
use crate::error::DiffResult;
use crate::token::{DelimiterFamily, Side, Token};

/// An opening delimiter waiting for its closer. Moves track both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingOpen {
    a: Option<usize>,
    b: Option<usize>,
}

/// Per-family stacks of opening delimiters seen in the current change.
#[derive(Debug, Default)]
pub struct BracketVerifier {
    stacks: BTreeMap<DelimiterFamily, Vec<PendingOpen>>,
}

impl BracketVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track one committed token. For moves `token` is the side-A token
    /// and `partner_b` the index it pairs with on side B.
    pub fn track(&mut self, token: &Token, partner_b: Option<usize>) {
        let Some(family) = token.family() else {
            return;
        };
        let pending = match token.side {
            Side::A => PendingOpen {
                a: Some(token.index),
                b: partner_b,
            },
            Side::B => PendingOpen {
                a: None,
                b: Some(token.index),
            },
        };

        if token.is_opening() {
            self.stacks.entry(family).or_default().push(pending);
        } else if token.is_closing() {
            // A closer with nothing open in this change belongs to an
            // opener committed elsewhere.
            if let Some(stack) = self.stacks.get_mut(&family) {
                stack.pop();
            }
        }
    }

    /// True when every tracked opener was closed inside the change.
    pub fn is_balanced(&self) -> bool {
        self.stacks.values().all(Vec::is_empty)
    }

    /// Report the partners of every unclosed opener, innermost first.
    ///
    /// `parent` is the move the tracked tokens were committed by; partner
    /// moves are recorded as its closing moves.
    pub(crate) fn verify(
        &mut self,
        kind: ChangeKind,
        state: &mut EngineState,
        parent: Option<usize>,
    ) -> DiffResult<()> {
        let stacks = std::mem::take(&mut self.stacks);
        for (family, mut stack) in stacks {
            while let Some(open) = stack.pop() {
                debug!(?family, ?kind, a = ?open.a, b = ?open.b, "closing unpaired delimiter");
                match kind {
                    ChangeKind::Deletion => close_single(state, Side::A, open.a)?,
                    ChangeKind::Addition => close_single(state, Side::B, open.b)?,
                    ChangeKind::Move => close_pair(state, open, parent)?,
                }
            }
        }
        Ok(())
    }

    /// Single-token form: report the partner of the delimiter at `index`
    /// on `side` as the same kind of edit.
    pub(crate) fn verify_single(
        state: &mut EngineState,
        side: Side,
        index: usize,
    ) -> DiffResult<()> {
        let Some(token) = state.stream(side).get(index) else {
            return Ok(());
        };
        if !token.is_opening() {
            return Ok(());
        }
        let mut verifier = Self::new();
        verifier.track(token, None);
        let kind = match side {
            Side::A => ChangeKind::Deletion,
            Side::B => ChangeKind::Addition,
        };
        verifier.verify(kind, state, None)
    }
}

/// Unmatched structural partner of the opener at `open` on `side`.
fn unmatched_partner(state: &EngineState, side: Side, open: Option<usize>) -> Option<usize> {
    let stream = state.stream(side);
    let open = stream.get(open?)?;
    stream
        .find_closing_token(open, open.index + 1)
        .filter(|t| !t.is_matched())
        .map(|t| t.index)
}

fn close_single(state: &mut EngineState, side: Side, open: Option<usize>) -> DiffResult<()> {
    if let Some(partner) = unmatched_partner(state, side, open) {
        state.report_edit(side, partner)?;
    }
    Ok(())
}

fn close_pair(state: &mut EngineState, open: PendingOpen, parent: Option<usize>) -> DiffResult<()> {
    let partner_a = unmatched_partner(state, Side::A, open.a);
    let partner_b = unmatched_partner(state, Side::B, open.b);

    match (partner_a, partner_b) {
        (Some(a), Some(b)) => {
            let equal = match (state.a.get(a), state.b.get(b)) {
                (Some(x), Some(y)) => x.same_content(y),
                _ => false,
            };
            if equal {
                let child = state.commit_move(a, b, 1)?;
                if let Some(parent) = parent {
                    state.changes.add_closing_move(parent, child)?;
                }
            } else {
                state.report_edit(Side::A, a)?;
                state.report_edit(Side::B, b)?;
            }
        }
        (Some(a), None) => {
            warn!(a, "closing delimiter only found on side a");
            state.report_edit(Side::A, a)?;
        }
        (None, Some(b)) => {
            warn!(b, "closing delimiter only found on side b");
            state.report_edit(Side::B, b)?;
        }
        (None, None) => {}
    }
    Ok(())
}
