//! Longest-run search between the two token streams.
//!
//! Given an unmatched anchor on side A the matcher:
//!
//! 1. gathers the equal tokens on side B,
//! 2. measures the forward run from the anchor to each candidate and keeps
//!    the longest (first found wins ties),
//! 3. refines it with a zigzag search: every side-B position inside the
//!    best run's window becomes a new probe, searched back on side A, and
//!    whenever a longer run turns up its tokens become the probe for the
//!    opposite side. Each position is searched twice, forward only and
//!    backward-then-forward, and the longer result is kept,
//! 4. tries one backward extension of the winner.
//!
//! The matcher only reads the streams; committing the run is up to the
//! caller.

use tracing::trace;

use crate::error::{DiffError, DiffResult};
use crate::token::{Side, Token, TokenStream};

/// A run of pairwise equal unmatched tokens: `a..a+len` pairs with `b..b+len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Run {
    pub a: usize,
    pub b: usize,
    pub len: usize,
}

impl Run {
    pub const fn new(a: usize, b: usize, len: usize) -> Self {
        Self { a, b, len }
    }

    const fn start(&self, side: Side) -> usize {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Forward,
    BackwardThenForward,
}

/// Read-only run search over both streams.
pub struct SequenceMatcher<'s> {
    a: &'s TokenStream,
    b: &'s TokenStream,
    max_matching_offset: usize,
}

impl<'s> SequenceMatcher<'s> {
    pub const fn new(a: &'s TokenStream, b: &'s TokenStream, max_matching_offset: usize) -> Self {
        Self {
            a,
            b,
            max_matching_offset,
        }
    }

    /// Best run for the anchor at side-A `anchor`, `None` when the anchor
    /// has no equal token anywhere on side B.
    pub fn best_run(&self, anchor: usize) -> DiffResult<Option<Run>> {
        let Some(token) = self.a.peek(anchor) else {
            return Err(DiffError::invariant(
                "anchor is not an unmatched token",
                format!("a[{anchor}]"),
            ));
        };

        let candidates = self.b.find(token);
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut best = Run::default();
        for candidate in candidates {
            let len = self.forward_len(anchor, candidate);
            if len > best.len {
                best = Run::new(anchor, candidate, len);
            }
        }
        if best.len == 0 {
            return Err(DiffError::invariant(
                "run search returned zero for an equal candidate",
                token.describe(),
            ));
        }

        let window = best.len.min(self.max_matching_offset.max(1));
        let initial = best;
        for probe in initial.b..initial.b + window {
            if self.b.peek(probe).is_none() {
                continue;
            }
            let forward = self.zigzag(probe, Pass::Forward);
            let backward = self.zigzag(probe, Pass::BackwardThenForward);
            let refined = if backward.len > forward.len { backward } else { forward };
            if refined.len > best.len {
                trace!(probe, from = best.len, to = refined.len, "zigzag improved run");
                best = refined;
            }
        }

        let back = self.backward_len(best.a, best.b);
        if back > 0 {
            best = Run::new(best.a - back, best.b - back, best.len + back);
        }

        Ok(Some(best))
    }

    /// Alternating-side refinement seeded with the side-B token at `start_b`.
    ///
    /// The probe is a token run on `probe_side`; its occurrences on the other
    /// side are measured and the longest strictly better run becomes the
    /// next probe, on the opposite side. Stops after a round with no
    /// improvement, so the run length strictly grows every iteration.
    fn zigzag(&self, start_b: usize, pass: Pass) -> Run {
        let mut best = Run::default();
        let mut probe_side = Side::B;
        let mut probe = Run::new(start_b, start_b, 1);

        loop {
            let probe_stream = self.stream(probe_side);
            let start = probe.start(probe_side);
            let tokens: Vec<&Token> = (start..start + probe.len)
                .map_while(|i| probe_stream.peek(i))
                .collect();
            if tokens.len() != probe.len {
                break best;
            }

            let mut improved = false;
            for candidate in self.stream(probe_side.opposite()).find_sequence(&tokens) {
                let (a, b) = match probe_side {
                    Side::A => (start, candidate),
                    Side::B => (candidate, start),
                };
                let run = self.measure(a, b, pass);
                if run.len > best.len {
                    best = run;
                    improved = true;
                }
            }

            if !improved {
                break best;
            }
            probe_side = probe_side.opposite();
            probe = best;
        }
    }

    fn measure(&self, a: usize, b: usize, pass: Pass) -> Run {
        let forward = self.forward_len(a, b);
        match pass {
            Pass::Forward => Run::new(a, b, forward),
            Pass::BackwardThenForward => {
                let back = self.backward_len(a, b);
                Run::new(a - back, b - back, back + forward)
            }
        }
    }

    /// Length of the equal run starting at `(a, b)`.
    pub fn forward_len(&self, a: usize, b: usize) -> usize {
        let mut len = 0;
        while let (Some(x), Some(y)) = (self.a.peek(a + len), self.b.peek(b + len)) {
            if !x.same_content(y) {
                break;
            }
            len += 1;
        }
        len
    }

    /// Number of equal pairs immediately before `(a, b)`.
    pub fn backward_len(&self, a: usize, b: usize) -> usize {
        let mut len = 0;
        while len < a && len < b {
            match (self.a.peek(a - len - 1), self.b.peek(b - len - 1)) {
                (Some(x), Some(y)) if x.same_content(y) => len += 1,
                _ => break,
            }
        }
        len
    }

    const fn stream(&self, side: Side) -> &'s TokenStream {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Classification;
    use crate::token::testing::raw;

    fn streams(a: &str, b: &str) -> (TokenStream, TokenStream) {
        (
            TokenStream::new(Side::A, raw(a)).expect("valid a"),
            TokenStream::new(Side::B, raw(b)).expect("valid b"),
        )
    }

    #[test]
    fn test_no_candidates() {
        let (a, b) = streams("x", "y");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert_eq!(matcher.best_run(0).expect("search"), None);
    }

    #[test]
    fn test_longest_candidate_wins() {
        let (a, b) = streams("f ( x ) ;", "f ; f ( x ) ;");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert_eq!(matcher.best_run(0).expect("search"), Some(Run::new(0, 2, 5)));
    }

    #[test]
    fn test_first_found_wins_ties() {
        let (a, b) = streams("x y", "x y q x y");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert_eq!(matcher.best_run(0).expect("search"), Some(Run::new(0, 0, 2)));
    }

    #[test]
    fn test_zigzag_finds_longer_run_elsewhere() {
        // The anchor `(` only reaches `( )` directly, while the `( )` pair
        // on side B also starts the longer run `( ) ; done` shared with
        // the second half of side A.
        let (a, b) = streams("( ) q log ( ) ; done", "log ( ) ; done");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        let run = matcher.best_run(0).expect("search").expect("run");
        assert_eq!(run, Run::new(3, 0, 5));
    }

    #[test]
    fn test_backward_extension() {
        let (mut a, b) = streams("p q r s", "p q r s");
        // Anchor in the middle with everything before still unmatched.
        a.mark(3, Classification::Deleted, 1).expect("mark");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert_eq!(matcher.backward_len(2, 2), 2);
        let run = matcher.best_run(2).expect("search").expect("run");
        assert_eq!(run, Run::new(0, 0, 3));
    }

    #[test]
    fn test_runs_stop_at_matched_tokens() {
        let (a, mut b) = streams("a b c", "a b c");
        b.mark(1, Classification::Added, 1).expect("mark");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert_eq!(matcher.forward_len(0, 0), 1);
        assert_eq!(matcher.forward_len(2, 2), 1);
    }

    #[test]
    fn test_matched_anchor_is_invariant_violation() {
        let (mut a, b) = streams("a", "a");
        a.mark(0, Classification::Deleted, 1).expect("mark");
        let matcher = SequenceMatcher::new(&a, &b, 500);
        assert!(matcher.best_run(0).is_err());
    }
}
