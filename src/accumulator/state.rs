use crate::batch::{Batch, Cursor, Row};

/// Generation of a fetch sequence. Every `fetch` and `cancel` starts a new one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching { pages: u64 },
    Complete,
}

/// What a page did to the state it was applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// The page belongs to a superseded sequence and was ignored.
    Stale,
    /// The page was merged and the sequence goes on from `cursor`.
    Continue { pages: u64, cursor: Cursor },
    /// The page was full but did not say where to continue from.
    MissingCursor { pages: u64 },
    /// The page was the last one.
    Complete { pages: u64 },
}

/// Rows merged so far by one accumulator, together with the bookkeeping that
/// tells current pages from stale ones.
#[derive(Debug, Clone)]
pub struct AggregationState {
    rows: Vec<Row>,
    pages: u64,
    epoch: Epoch,
    phase: Phase,
}

impl Default for AggregationState {
    fn default() -> Self {
        Self {
            rows: vec![],
            pages: 0,
            epoch: Epoch::default(),
            phase: Phase::Idle,
        }
    }
}

impl AggregationState {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch == epoch
    }

    /// Discards everything and opens a new sequence.
    pub fn begin(&mut self) -> Epoch {
        self.reset(Phase::Fetching { pages: 0 })
    }

    /// Discards everything without opening a new sequence.
    pub fn cancel(&mut self) -> Epoch {
        self.reset(Phase::Idle)
    }

    fn reset(&mut self, phase: Phase) -> Epoch {
        self.epoch = self.epoch.next();
        self.rows.clear();
        self.pages = 0;
        self.phase = phase;
        self.epoch
    }

    /// Merges `batch` into the state if it was requested under the current
    /// epoch. `group` receives the previously merged rows followed by the new
    /// ones and must be idempotent.
    pub fn apply_page<G>(
        &mut self,
        epoch: Epoch,
        batch: Batch,
        batch_size: usize,
        group: G,
    ) -> PageOutcome
    where
        G: FnOnce(Vec<Row>) -> Vec<Row>,
    {
        if !self.is_current(epoch) || !matches!(self.phase, Phase::Fetching { .. }) {
            return PageOutcome::Stale;
        }

        let terminal = batch.is_terminal(batch_size);
        let Batch { rows, cursor } = batch;
        let mut merged = std::mem::take(&mut self.rows);
        merged.extend(rows);
        self.rows = group(merged);
        self.pages += 1;

        if terminal {
            self.phase = Phase::Complete;
            return PageOutcome::Complete { pages: self.pages };
        }
        match cursor {
            Some(cursor) => {
                self.phase = Phase::Fetching { pages: self.pages };
                PageOutcome::Continue {
                    pages: self.pages,
                    cursor,
                }
            }
            None => {
                self.fail();
                PageOutcome::MissingCursor { pages: self.pages }
            }
        }
    }

    /// Records a failed request of the current sequence. Returns `false` if
    /// the request was stale and nothing changed.
    pub fn apply_failure(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch) || !matches!(self.phase, Phase::Fetching { .. }) {
            return false;
        }
        self.fail();
        true
    }

    fn fail(&mut self) {
        self.rows.clear();
        self.phase = Phase::Idle;
    }
}
