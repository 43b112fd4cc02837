//! Paginated fetching with incremental aggregation.
//!
//! A [`SeriesAccumulator`] walks a collection query page by page, merges each
//! page into its [`AggregationState`] with the series' grouping and tells its
//! observer about every step. Requests cannot be aborted at the transport
//! level, so every sequence is tagged with an [`Epoch`] when it starts; a
//! page that arrives after a newer `fetch` or `cancel` does not match the
//! current epoch and is dropped without touching the state or the observer.

mod observer;
mod state;

pub use observer::{ChannelObserver, NoopObserver, SeriesEvent, SeriesObserver};
pub use state::{AggregationState, Epoch, PageOutcome, Phase};

use crate::{
    batch::Row,
    client::PageSource,
    error::FetchError,
    query::Query,
    series::SeriesSource,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Point-in-time copy of an accumulator's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub rows: Vec<Row>,
    pub pages: u64,
    pub epoch: Epoch,
    pub phase: Phase,
}

#[derive(Clone)]
pub struct SeriesAccumulator {
    pages: Arc<dyn PageSource>,
    series: Arc<dyn SeriesSource>,
    observer: Arc<dyn SeriesObserver>,
    state: Arc<Mutex<AggregationState>>,
    last_query: Arc<Mutex<Option<Query>>>,
}

impl SeriesAccumulator {
    pub fn new(
        pages: Arc<dyn PageSource>,
        series: Arc<dyn SeriesSource>,
        observer: Arc<dyn SeriesObserver>,
    ) -> Self {
        Self {
            pages,
            series,
            observer,
            state: Default::default(),
            last_query: Default::default(),
        }
    }

    /// Starts a new fetch sequence for `query`, superseding any sequence in
    /// flight. Must be called from within a tokio runtime.
    pub fn fetch(&self, query: Query) -> Epoch {
        *self.last_query.lock() = Some(query.clone());
        let epoch = self.state.lock().begin();
        tracing::debug!(
            collection = %query.collection_url(),
            epoch = epoch.value(),
            "starting fetch sequence"
        );
        let chain = FetchChain {
            pages: self.pages.clone(),
            series: self.series.clone(),
            observer: self.observer.clone(),
            state: self.state.clone(),
            query,
            epoch,
        };
        tokio::spawn(chain.run());
        epoch
    }

    /// Starts over with the query of the latest `fetch`. Returns `None` if
    /// nothing was fetched yet.
    pub fn reset(&self) -> Option<Epoch> {
        let query = self.last_query.lock().clone()?;
        Some(self.fetch(query))
    }

    /// Stops notifications from the sequence in flight and drops the
    /// aggregate, without requesting anything.
    pub fn cancel(&self) -> Epoch {
        let epoch = self.state.lock().cancel();
        tracing::debug!(epoch = epoch.value(), "fetch sequence cancelled");
        epoch
    }

    pub fn series(&self) -> &Arc<dyn SeriesSource> {
        &self.series
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state.lock().rows().to_vec()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase()
    }

    pub fn epoch(&self) -> Epoch {
        self.state.lock().epoch()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            rows: state.rows().to_vec(),
            pages: state.pages(),
            epoch: state.epoch(),
            phase: state.phase(),
        }
    }
}

/// One fetch sequence: requests pages strictly one after another until the
/// last page arrives, a request fails, or the sequence goes stale.
struct FetchChain {
    pages: Arc<dyn PageSource>,
    series: Arc<dyn SeriesSource>,
    observer: Arc<dyn SeriesObserver>,
    state: Arc<Mutex<AggregationState>>,
    query: Query,
    epoch: Epoch,
}

impl FetchChain {
    async fn run(self) {
        let mut response = self.pages.first_page(&self.query).await;
        loop {
            let batch = match response {
                Ok(batch) => batch,
                Err(err) => {
                    self.fail(err.into());
                    return;
                }
            };

            let cursor = {
                let mut state = self.state.lock();
                let outcome = state.apply_page(
                    self.epoch,
                    batch,
                    self.query.batch_size(),
                    |rows| self.series.group_results(rows),
                );
                match outcome {
                    PageOutcome::Stale => {
                        tracing::debug!(epoch = self.epoch.value(), "discarding stale page");
                        return;
                    }
                    PageOutcome::Continue { pages, cursor } => {
                        self.observer.on_results_updated(state.rows());
                        self.observer.on_progress(pages);
                        cursor
                    }
                    PageOutcome::Complete { pages } => {
                        self.observer.on_results_updated(state.rows());
                        self.observer.on_complete();
                        tracing::info!(
                            collection = %self.query.collection_url(),
                            epoch = self.epoch.value(),
                            pages,
                            rows = state.rows().len(),
                            "all results loaded"
                        );
                        return;
                    }
                    PageOutcome::MissingCursor { pages } => {
                        let err = FetchError::MissingCursor { page: pages };
                        tracing::warn!(epoch = self.epoch.value(), err = %err, "fetch sequence failed");
                        self.observer.on_error(&err);
                        return;
                    }
                }
            };

            response = self.pages.next_page(&self.query, &cursor).await;
        }
    }

    fn fail(&self, err: FetchError) {
        let mut state = self.state.lock();
        if state.apply_failure(self.epoch) {
            tracing::warn!(epoch = self.epoch.value(), err = %err, "fetch sequence failed");
            self.observer.on_error(&err);
        } else {
            tracing::debug!(epoch = self.epoch.value(), err = %err, "ignoring failure of stale request");
        }
    }
}
