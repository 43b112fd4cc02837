use crate::{
    accumulator::{Epoch, SeriesAccumulator, SeriesObserver},
    cache::RequestCache,
    client::{MongooseClient, PageSource},
    error::TransportError,
    query::Query,
    series::SeriesSource,
    settings::SourceSettings,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("cannot build collection url: {0}")]
    CollectionUrl(#[from] url::ParseError),
    #[error("cannot build data source client: {0}")]
    Client(#[from] TransportError),
    #[error("no chart named '{0}' is registered")]
    UnknownChart(String),
}

/// Everything one dashboard page shares between its charts: the data source
/// client (and with it the request cache) and the registry of live series.
pub struct DashboardContext {
    client: MongooseClient,
    pages: Arc<dyn PageSource>,
    settings: SourceSettings,
    charts: Mutex<HashMap<String, SeriesAccumulator>>,
}

impl DashboardContext {
    pub fn new(settings: SourceSettings) -> Result<Self, ContextError> {
        let client = MongooseClient::new(
            settings.url.clone(),
            settings.http_timeout(),
            Arc::new(RequestCache::new()),
        )?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: MongooseClient, settings: SourceSettings) -> Self {
        Self {
            pages: Arc::new(client.clone()),
            client,
            settings,
            charts: Default::default(),
        }
    }

    pub fn client(&self) -> &MongooseClient {
        &self.client
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        self.client.cache()
    }

    /// Query for `series` against the configured database and page size.
    pub fn query_for(&self, series: &dyn SeriesSource) -> Result<Query, ContextError> {
        let collection_url = self
            .client
            .collection_url(&self.settings.database, series.collection_name())?;
        let mut query = Query::new(collection_url)?
            .with_criteria(series.find_criteria())
            .with_batch_size(self.settings.batch_size);
        if let Some(fields) = series.projection_fields() {
            query = query.with_projection(fields);
        }
        Ok(query)
    }

    /// Accumulator for `series` that is not tracked by the chart registry.
    pub fn accumulator(
        &self,
        series: Arc<dyn SeriesSource>,
        observer: Arc<dyn SeriesObserver>,
    ) -> SeriesAccumulator {
        SeriesAccumulator::new(self.pages.clone(), series, observer)
    }

    /// Registers a chart under `name`, replacing (and cancelling) any chart
    /// registered under the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        series: Arc<dyn SeriesSource>,
        observer: Arc<dyn SeriesObserver>,
    ) -> SeriesAccumulator {
        let name = name.into();
        let accumulator = self.accumulator(series, observer);
        let previous = self.charts.lock().insert(name.clone(), accumulator.clone());
        if let Some(previous) = previous {
            tracing::debug!(chart = %name, "replacing registered chart");
            previous.cancel();
        }
        accumulator
    }

    /// Re-fetches the series of chart `name` from scratch.
    pub fn refresh(&self, name: &str) -> Result<Epoch, ContextError> {
        let accumulator = self.chart(name)?;
        let query = self.query_for(accumulator.series().as_ref())?;
        Ok(accumulator.fetch(query))
    }

    pub fn refresh_all(&self) -> Result<(), ContextError> {
        let names: Vec<String> = self.charts.lock().keys().cloned().collect();
        for name in names {
            self.refresh(&name)?;
        }
        Ok(())
    }

    /// Unregisters chart `name`; its sequence in flight is cancelled.
    pub fn remove(&self, name: &str) -> Option<SeriesAccumulator> {
        let accumulator = self.charts.lock().remove(name)?;
        accumulator.cancel();
        Some(accumulator)
    }

    pub fn chart(&self, name: &str) -> Result<SeriesAccumulator, ContextError> {
        self.charts
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ContextError::UnknownChart(name.to_string()))
    }

    pub fn chart_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.charts.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accumulator::{NoopObserver, Phase},
        series::{AccuracyGainSeries, RetentionSeries},
    };
    use pretty_assertions::assert_eq;
    use url::Url;

    fn context() -> DashboardContext {
        let settings = SourceSettings {
            url: Url::parse("http://localhost:27080/").unwrap(),
            database: "test".to_string(),
            batch_size: 100,
            ..Default::default()
        };
        DashboardContext::new(settings).unwrap()
    }

    #[test]
    fn query_uses_settings_and_series() {
        let context = context();
        let query = context
            .query_for(&AccuracyGainSeries::new(2))
            .unwrap();
        assert_eq!(
            query.find_url().as_str(),
            "http://localhost:27080/test/accuracy_deltas/_find"
        );
        assert_eq!(query.batch_size(), 100);
        let params = query.find_params();
        assert_eq!(params["criteria"], r#"{"num_problems_done":"16"}"#);
        assert_eq!(
            params["fields"],
            r#"{"card_number":1,"num_deltas":1,"sum_deltas":1}"#
        );
    }

    #[tokio::test]
    async fn remove_cancels_chart() {
        let context = context();
        let chart = context.register(
            "retention",
            Arc::new(RetentionSeries::default()),
            Arc::new(NoopObserver),
        );
        assert_eq!(context.chart_names(), vec!["retention".to_string()]);

        let epoch = chart.epoch();
        let removed = context.remove("retention").expect("chart is registered");
        assert!(removed.epoch() > epoch);
        assert_eq!(removed.phase(), Phase::Idle);
        assert!(matches!(
            context.refresh("retention"),
            Err(ContextError::UnknownChart(name)) if name == "retention"
        ));
    }

    #[tokio::test]
    async fn refresh_all_restarts_every_chart() {
        let context = context();
        let charts: Vec<_> = ["gain", "retention"]
            .into_iter()
            .map(|name| {
                context.register(name, Arc::new(RetentionSeries::default()), Arc::new(NoopObserver))
            })
            .collect();
        let before: Vec<_> = charts.iter().map(SeriesAccumulator::epoch).collect();

        context.refresh_all().unwrap();
        for (chart, before) in charts.iter().zip(before) {
            assert!(chart.epoch() > before);
            assert!(matches!(chart.phase(), Phase::Fetching { .. } | Phase::Idle));
        }
    }

    #[tokio::test]
    async fn registering_same_name_cancels_previous_chart() {
        let context = context();
        let first = context.register(
            "gain",
            Arc::new(AccuracyGainSeries::new(1)),
            Arc::new(NoopObserver),
        );
        let epoch = first.epoch();
        context.register(
            "gain",
            Arc::new(AccuracyGainSeries::new(2)),
            Arc::new(NoopObserver),
        );
        assert!(first.epoch() > epoch);
        assert_eq!(context.chart_names().len(), 1);
    }
}
