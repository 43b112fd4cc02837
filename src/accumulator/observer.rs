use crate::{batch::Row, error::FetchError};
use tokio::sync::mpsc;

/// Receives notifications of the current fetch sequence of an accumulator.
///
/// Callbacks run while the accumulator holds its state lock, so they must not
/// call back into the same accumulator; spawn a task for that instead.
pub trait SeriesObserver: Send + Sync {
    /// Called with the whole merged aggregate after every page.
    fn on_results_updated(&self, _rows: &[Row]) {}
    /// Called after every full page with the number of pages consumed so far.
    fn on_progress(&self, _pages: u64) {}
    /// Called once after the last page has been merged.
    fn on_complete(&self) {}
    fn on_error(&self, _error: &FetchError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SeriesObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub enum SeriesEvent {
    ResultsUpdated(Vec<Row>),
    Progress(u64),
    Complete,
    Error(FetchError),
}

/// Forwards notifications into a channel, for consumers living in their own task.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<SeriesEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SeriesEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: SeriesEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("series event receiver dropped");
        }
    }
}

impl SeriesObserver for ChannelObserver {
    fn on_results_updated(&self, rows: &[Row]) {
        self.send(SeriesEvent::ResultsUpdated(rows.to_vec()));
    }

    fn on_progress(&self, pages: u64) {
        self.send(SeriesEvent::Progress(pages));
    }

    fn on_complete(&self) {
        self.send(SeriesEvent::Complete);
    }

    fn on_error(&self, error: &FetchError) {
        self.send(SeriesEvent::Error(error.clone()));
    }
}
