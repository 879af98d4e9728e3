//! Generic Viterbi decoder over a lattice of per-position candidates.
//!
//! The decoder knows nothing about what it is choosing between.  A
//! [`CandidateSource`] supplies, for every input item, the candidates with
//! their target scores, and scores the transition between two candidates
//! of adjacent positions.  The decoder keeps one surviving path per
//! (position, candidate) cell and reads the N best complete paths back
//! from the last position.
//!
//! ```text
//! point 0 (sentinel)   point 1          point 2
//!   [path 0] ───────▶ [cand 0] ───────▶ [cand 0]
//!                 └─▶ [cand 1] ──┐  └─▶ [cand 1]
//!                                └────▶ ...
//! ```
//!
//! The sentinel point carries a single score-0 path with no candidate, so
//! the first real position scores `target` only and every later position
//! scores `target + transition + previous`.

use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Data-source contract
// ─────────────────────────────────────────────────────────────────────────────

/// One choice at one lattice position.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<V> {
    /// Target (emission) score, independent of context.
    pub score: f64,
    pub value: V,
    /// Index of the input item this candidate belongs to; filled in by the decoder.
    pub item: usize,
}

impl<V> Candidate<V> {
    pub fn new(score: f64, value: V) -> Self {
        Self { score, value, item: 0 }
    }
}

/// Supplies the lattice to a [`Decoder`].
pub trait CandidateSource {
    type Item;
    type Value;

    /// Candidates for `item`.  An empty list makes the lattice dead: the
    /// search stops and no result is produced.
    fn candidates(&mut self, item: &Self::Item) -> Vec<Candidate<Self::Value>>;

    /// Score of moving from `prev` to `cur`.  Never asked for the first position.
    fn transition_score(&self, prev: &Candidate<Self::Value>, cur: &Candidate<Self::Value>) -> f64;

    /// Hand a candidate list back once the decoder has finished with it.
    fn release_candidates(&mut self, _candidates: Vec<Candidate<Self::Value>>) {}
}

/// Direction of score comparison, fixed for the lifetime of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
    BiggerIsBetter,
    SmallerIsBetter,
}

impl ScoreOrder {
    /// `true` when `a` is strictly better than `b`.
    #[inline]
    pub fn better(self, a: f64, b: f64) -> bool {
        match self {
            ScoreOrder::BiggerIsBetter => a > b,
            ScoreOrder::SmallerIsBetter => a < b,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeline
// ─────────────────────────────────────────────────────────────────────────────

/// Survivor in one cell.  The predecessor is the cell `prev_state` of the
/// previous point; the candidate is the one at this cell's own index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Path {
    score: f64,
    prev_state: Option<usize>,
}

struct TimelinePoint<V> {
    candidates: Vec<Candidate<V>>,
    cells: Vec<Option<Path>>,
}

impl<V> TimelinePoint<V> {
    fn sentinel() -> Self {
        Self {
            candidates: Vec::new(),
            cells: vec![Some(Path { score: 0.0, prev_state: None })],
        }
    }
}

/// Keep `path` in `cells[state]` if the cell is empty or `path` is strictly
/// better than its occupant.  Ties keep the earlier occupant.
///
/// # Panics
/// If `state` is outside the cell array, which means the candidate source
/// broke its contract.
fn add_path(order: ScoreOrder, cells: &mut [Option<Path>], state: usize, path: Path) {
    assert!(
        state < cells.len(),
        "viterbi state index {} out of range ({} states)",
        state,
        cells.len()
    );
    match cells[state] {
        Some(old) if !order.better(path.score, old.score) => {}
        _ => cells[state] = Some(path),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Uninitialized,
    /// Timeline allocated with its sentinel point.
    Initialized,
    /// Forward pass complete; results can be read any number of times.
    Searched,
    /// Some position had no candidates.
    DeadEnd,
}

/// One complete path through the lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPath<V> {
    pub score: f64,
    /// Chosen candidate values, one per input item, in input order.
    pub values: Vec<V>,
}

pub struct Decoder<S: CandidateSource> {
    source: S,
    order: ScoreOrder,
    items: Vec<S::Item>,
    timeline: Vec<TimelinePoint<S::Value>>,
    state: DecoderState,
}

impl<S: CandidateSource> fmt::Debug for Decoder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("order", &self.order)
            .field("items", &self.items.len())
            .field("points", &self.timeline.len())
            .field("state", &self.state)
            .finish()
    }
}

impl<S: CandidateSource> Decoder<S> {
    pub fn new(source: S, order: ScoreOrder) -> Self {
        Self {
            source,
            order,
            items: Vec::new(),
            timeline: Vec::new(),
            state: DecoderState::Uninitialized,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn order(&self) -> ScoreOrder {
        self.order
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn release_timeline(&mut self) {
        for point in self.timeline.drain(..) {
            if !point.candidates.is_empty() {
                self.source.release_candidates(point.candidates);
            }
        }
    }

    /// Reset the timeline for a new item sequence.
    pub fn initialize(&mut self, items: Vec<S::Item>) {
        self.release_timeline();
        self.timeline.reserve(items.len() + 1);
        self.timeline.push(TimelinePoint::sentinel());
        self.items = items;
        self.state = DecoderState::Initialized;
    }

    /// Run the forward pass.  Only has an effect right after [`initialize`](Self::initialize).
    pub fn search(&mut self) {
        if self.state != DecoderState::Initialized {
            tracing::warn!(state = ?self.state, "viterbi search requested outside the initialized state");
            return;
        }

        let mut transitions = 0usize;
        let mut widest = 0usize;
        for pos in 0..self.items.len() {
            let mut candidates = self.source.candidates(&self.items[pos]);
            if candidates.is_empty() {
                tracing::debug!(position = pos, "no candidates; lattice is dead");
                self.state = DecoderState::DeadEnd;
                return;
            }
            for c in candidates.iter_mut() {
                c.item = pos;
            }
            widest = widest.max(candidates.len());

            let mut cells: Vec<Option<Path>> = vec![None; candidates.len()];
            let prev = &self.timeline[pos];
            for (prev_state, prev_path) in prev.cells.iter().enumerate() {
                let Some(prev_path) = prev_path else { continue };
                for (state, cand) in candidates.iter().enumerate() {
                    let score = if pos == 0 {
                        cand.score + prev_path.score
                    } else {
                        transitions += 1;
                        let trans = self.source.transition_score(&prev.candidates[prev_state], cand);
                        cand.score + trans + prev_path.score
                    };
                    add_path(
                        self.order,
                        &mut cells,
                        state,
                        Path { score, prev_state: Some(prev_state) },
                    );
                }
            }
            self.timeline.push(TimelinePoint { candidates, cells });
        }

        tracing::debug!(
            positions = self.items.len(),
            widest,
            transitions,
            "viterbi search complete"
        );
        self.state = DecoderState::Searched;
    }

    /// Up to `n` best complete paths, best first.
    ///
    /// Empty when the decoder has not searched, the input was empty, or the
    /// lattice is dead.
    pub fn get_result(&self, n: usize) -> Vec<DecodedPath<S::Value>>
    where
        S::Value: Clone,
    {
        if self.state != DecoderState::Searched || self.items.is_empty() || n == 0 {
            return Vec::new();
        }
        let Some(last) = self.timeline.last() else {
            return Vec::new();
        };

        // Insertion sort of terminal cells; equal scores keep scan order.
        let mut ranked: Vec<(usize, f64)> = Vec::with_capacity(n);
        for (state, cell) in last.cells.iter().enumerate() {
            let Some(path) = cell else { continue };
            let at = ranked
                .iter()
                .position(|&(_, s)| self.order.better(path.score, s))
                .unwrap_or(ranked.len());
            if at < n {
                ranked.insert(at, (state, path.score));
                ranked.truncate(n);
            }
        }

        ranked
            .into_iter()
            .map(|(state, score)| DecodedPath { score, values: self.trace_back(state) })
            .collect()
    }

    /// Convenience for `get_result(1)`.
    pub fn best(&self) -> Option<DecodedPath<S::Value>>
    where
        S::Value: Clone,
    {
        self.get_result(1).into_iter().next()
    }

    fn trace_back(&self, mut state: usize) -> Vec<S::Value>
    where
        S::Value: Clone,
    {
        let mut values = Vec::with_capacity(self.items.len());
        for point in self.timeline[1..].iter().rev() {
            values.push(point.candidates[state].value.clone());
            match point.cells[state].and_then(|p| p.prev_state) {
                Some(prev) => state = prev,
                None => break,
            }
        }
        values.reverse();
        values
    }
}

impl<S: CandidateSource> Drop for Decoder<S> {
    fn drop(&mut self) {
        self.release_timeline();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Lattice given as per-position target scores; candidate value is
    /// `(position, index)` and transitions come from `trans(prev, cur)`.
    struct Grid {
        scores: Vec<Vec<f64>>,
        trans: fn((usize, usize), (usize, usize)) -> f64,
        transition_calls: Cell<usize>,
        released: usize,
    }

    impl Grid {
        fn new(scores: Vec<Vec<f64>>) -> Self {
            Self::with_trans(scores, |_, _| 0.0)
        }

        fn with_trans(scores: Vec<Vec<f64>>, trans: fn((usize, usize), (usize, usize)) -> f64) -> Self {
            Self { scores, trans, transition_calls: Cell::new(0), released: 0 }
        }
    }

    impl CandidateSource for Grid {
        type Item = usize;
        type Value = (usize, usize);

        fn candidates(&mut self, item: &usize) -> Vec<Candidate<(usize, usize)>> {
            self.scores[*item]
                .iter()
                .enumerate()
                .map(|(i, &s)| Candidate::new(s, (*item, i)))
                .collect()
        }

        fn transition_score(&self, prev: &Candidate<(usize, usize)>, cur: &Candidate<(usize, usize)>) -> f64 {
            self.transition_calls.set(self.transition_calls.get() + 1);
            (self.trans)(prev.value, cur.value)
        }

        fn release_candidates(&mut self, _candidates: Vec<Candidate<(usize, usize)>>) {
            self.released += 1;
        }
    }

    fn decode(grid: Grid, order: ScoreOrder, n: usize) -> Vec<DecodedPath<(usize, usize)>> {
        let items: Vec<usize> = (0..grid.scores.len()).collect();
        let mut d = Decoder::new(grid, order);
        d.initialize(items);
        d.search();
        d.get_result(n)
    }

    fn indices(p: &DecodedPath<(usize, usize)>) -> Vec<usize> {
        p.values.iter().map(|&(_, i)| i).collect()
    }

    #[test]
    fn test_best_path_maximises_sum() {
        let grid = Grid::new(vec![vec![5.0, 1.0], vec![2.0, 9.0], vec![3.0, 3.0]]);
        let res = decode(grid, ScoreOrder::BiggerIsBetter, 1);
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].score, 17.0);
        // Tie on the last position: the earlier cell wins.
        assert_eq!(indices(&res[0]), vec![0, 1, 0]);
        assert_eq!(res[0].values[1], (1, 1));
    }

    #[test]
    fn test_smaller_is_better() {
        let grid = Grid::new(vec![vec![5.0, 1.0], vec![2.0, 9.0], vec![3.0, 4.0]]);
        let res = decode(grid, ScoreOrder::SmallerIsBetter, 1);
        assert_eq!(res[0].score, 6.0);
        assert_eq!(indices(&res[0]), vec![1, 0, 0]);
    }

    #[test]
    fn test_nbest_descending() {
        let grid = Grid::new(vec![vec![5.0, 1.0], vec![2.0, 9.0], vec![3.0, 1.0]]);
        let res = decode(grid, ScoreOrder::BiggerIsBetter, 2);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].score, 17.0);
        assert_eq!(res[1].score, 15.0);
        assert_eq!(indices(&res[0]), vec![0, 1, 0]);
        assert_eq!(indices(&res[1]), vec![0, 1, 1]);

        // Asking for more than there are terminal cells returns what exists.
        let grid = Grid::new(vec![vec![5.0, 1.0], vec![2.0, 9.0], vec![3.0, 1.0]]);
        assert_eq!(decode(grid, ScoreOrder::BiggerIsBetter, 10).len(), 2);
    }

    #[test]
    fn test_transitions_change_the_winner() {
        // Heavy penalty for switching index between positions.
        let grid = Grid::with_trans(vec![vec![5.0, 1.0], vec![2.0, 9.0]], |p, c| {
            if p.1 == c.1 { 0.0 } else { -100.0 }
        });
        let res = decode(grid, ScoreOrder::BiggerIsBetter, 1);
        assert_eq!(indices(&res[0]), vec![1, 1]);
        assert_eq!(res[0].score, 10.0);
    }

    #[test]
    fn test_first_position_has_no_transition() {
        let grid = Grid::new(vec![vec![1.0, 2.0], vec![3.0, 4.0, 5.0]]);
        let mut d = Decoder::new(grid, ScoreOrder::BiggerIsBetter);
        d.initialize(vec![0, 1]);
        d.search();
        assert_eq!(d.source().transition_calls.get(), 2 * 3);
    }

    #[test]
    fn test_tie_keeps_earliest_predecessor() {
        let grid = Grid::new(vec![vec![1.0, 1.0], vec![0.0]]);
        let res = decode(grid, ScoreOrder::BiggerIsBetter, 1);
        assert_eq!(indices(&res[0]), vec![0, 0]);
    }

    #[test]
    fn test_dead_lattice_yields_nothing() {
        let grid = Grid::new(vec![vec![1.0], vec![], vec![2.0]]);
        let items = vec![0, 1, 2];
        let mut d = Decoder::new(grid, ScoreOrder::BiggerIsBetter);
        d.initialize(items);
        d.search();
        assert_eq!(d.state(), DecoderState::DeadEnd);
        assert!(d.get_result(3).is_empty());
    }

    #[test]
    fn test_empty_and_unsearched() {
        let mut d = Decoder::new(Grid::new(vec![vec![1.0]]), ScoreOrder::BiggerIsBetter);
        assert!(d.get_result(1).is_empty());
        d.initialize(vec![0]);
        assert!(d.get_result(1).is_empty());
        d.initialize(Vec::new());
        d.search();
        assert_eq!(d.state(), DecoderState::Searched);
        assert!(d.get_result(1).is_empty());
    }

    #[test]
    fn test_results_are_repeatable_and_lists_released() {
        let mut d = Decoder::new(Grid::new(vec![vec![1.0, 2.0], vec![3.0]]), ScoreOrder::BiggerIsBetter);
        d.initialize(vec![0, 1]);
        d.search();
        let a = d.get_result(2);
        let b = d.get_result(2);
        assert_eq!(a, b);
        d.search();
        assert_eq!(d.get_result(2), a);

        d.initialize(vec![1]);
        assert_eq!(d.source().released, 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_add_path_rejects_bad_state() {
        let mut cells: Vec<Option<Path>> = vec![None; 2];
        add_path(ScoreOrder::BiggerIsBetter, &mut cells, 2, Path { score: 0.0, prev_state: None });
    }

    // ── Brute force cross-check ──────────────────────────────────────────────

    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 33) % 1000) as f64 / 10.0 - 50.0
    }

    fn trans_table(p: (usize, usize), c: (usize, usize)) -> f64 {
        // Deterministic but irregular.
        let h = (p.0 * 31 + p.1 * 17 + c.0 * 7 + c.1 * 13) % 23;
        h as f64 - 11.0
    }

    fn brute_force(scores: &[Vec<f64>], order: ScoreOrder) -> f64 {
        fn walk(scores: &[Vec<f64>], pos: usize, prev: Option<usize>, acc: f64, order: ScoreOrder, best: &mut Option<f64>) {
            if pos == scores.len() {
                if best.map_or(true, |b| order.better(acc, b)) {
                    *best = Some(acc);
                }
                return;
            }
            for (i, &s) in scores[pos].iter().enumerate() {
                let t = prev.map_or(0.0, |p| trans_table((pos - 1, p), (pos, i)));
                walk(scores, pos + 1, Some(i), acc + s + t, order, best);
            }
        }
        let mut best = None;
        walk(scores, 0, None, 0.0, order, &mut best);
        best.unwrap()
    }

    fn path_score(scores: &[Vec<f64>], idx: &[usize]) -> f64 {
        let mut total = 0.0;
        for (pos, &i) in idx.iter().enumerate() {
            total += scores[pos][i];
            if pos > 0 {
                total += trans_table((pos - 1, idx[pos - 1]), (pos, i));
            }
        }
        total
    }

    #[test]
    fn test_matches_brute_force_up_to_4x4() {
        let mut seed = 42u64;
        for len in 1..=4 {
            for width in 1..=4 {
                for order in [ScoreOrder::BiggerIsBetter, ScoreOrder::SmallerIsBetter] {
                    let scores: Vec<Vec<f64>> =
                        (0..len).map(|_| (0..width).map(|_| lcg(&mut seed)).collect()).collect();
                    let expected = brute_force(&scores, order);
                    let res = decode(Grid::with_trans(scores.clone(), trans_table), order, 1);
                    assert_eq!(res.len(), 1);
                    assert!((res[0].score - expected).abs() < 1e-9, "len={len} width={width}");
                    assert!((path_score(&scores, &indices(&res[0])) - expected).abs() < 1e-9);
                }
            }
        }
    }
}
