use anyhow::anyhow;
use clap::Parser;
use mongoose_series::{init_logs, Args, ChannelObserver, DashboardContext, SeriesEvent, Settings};
use std::sync::Arc;

const CHART: &str = "series-fetch";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = match &args.config_path {
        Some(path) => Settings::build(Some(path.as_path()))?,
        None => Settings::new()?,
    };
    init_logs(&settings.tracing)?;
    if let Some(batch_size) = args.batch_size {
        settings.source.batch_size = batch_size;
    }

    let series = args.series.into_series()?;
    let context = DashboardContext::new(settings.source)?;
    let (observer, mut events) = ChannelObserver::new();
    context.register(CHART, Arc::new(series), Arc::new(observer));
    let epoch = context.refresh(CHART)?;
    tracing::info!(epoch = epoch.value(), "fetching series");

    let mut rows = vec![];
    while let Some(event) = events.recv().await {
        match event {
            SeriesEvent::ResultsUpdated(updated) => rows = updated,
            SeriesEvent::Progress(pages) => {
                tracing::info!(pages, rows = rows.len(), "page loaded")
            }
            SeriesEvent::Complete => {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            SeriesEvent::Error(err) => return Err(err.into()),
        }
    }
    Err(anyhow!("fetch sequence ended without completing"))
}
