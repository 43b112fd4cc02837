pub mod accumulator;
pub mod aggregate;
pub mod batch;
pub mod cache;
mod cli;
pub mod client;
mod consts;
mod context;
mod error;
mod logging;
pub mod query;
pub mod series;
mod settings;
pub mod transport;

pub use accumulator::{
    ChannelObserver, Epoch, NoopObserver, Phase, SeriesAccumulator, SeriesEvent, SeriesObserver,
    Snapshot,
};
pub use batch::{Batch, Cursor, Row};
pub use cache::{Fetched, RequestCache};
pub use cli::{Args, SeriesCommand};
pub use client::{MongooseClient, PageSource};
pub use context::{ContextError, DashboardContext};
pub use error::{FetchError, TransportError};
pub use logging::init_logs;
pub use query::{Criterion, Query, QueryParams, SortOrder};
pub use settings::{Settings, SourceSettings, TracingFormat, TracingSettings};
