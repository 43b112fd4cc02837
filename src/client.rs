use crate::{
    batch::{ensure_acknowledged, Batch, Cursor},
    cache::RequestCache,
    error::TransportError,
    query::Query,
    transport::{HttpTransport, JsonTransport},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use url::Url;

/// Paginated access to a collection query.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Runs the query and returns its first page.
    async fn first_page(&self, query: &Query) -> Result<Batch, TransportError>;
    /// Continues a query from the cursor of its previous page.
    async fn next_page(&self, query: &Query, cursor: &Cursor) -> Result<Batch, TransportError>;
}

/// Client of a Sleepy Mongoose REST interface.
///
/// `_find` requests go through the shared request cache; `_more` requests
/// never do, since every continuation carries a distinct cursor. Only first
/// pages that end their result set are kept: a full page carries a
/// server-side cursor that is drained by the `_more` calls of whoever
/// received it first, so it cannot be replayed.
#[derive(Clone)]
pub struct MongooseClient {
    base_url: Url,
    transport: Arc<dyn JsonTransport>,
    cache: Arc<RequestCache>,
}

impl MongooseClient {
    pub fn new(base_url: Url, http_timeout: Duration, cache: Arc<RequestCache>) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(http_timeout)?;
        Ok(Self::with_transport(base_url, Arc::new(transport), cache))
    }

    pub fn with_transport(
        base_url: Url,
        transport: Arc<dyn JsonTransport>,
        cache: Arc<RequestCache>,
    ) -> Self {
        Self {
            base_url,
            transport,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    /// Url of `collection` inside `database`, suitable for [`Query::new`].
    pub fn collection_url(&self, database: &str, collection: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("{database}/{collection}/"))
    }
}

#[async_trait]
impl PageSource for MongooseClient {
    async fn first_page(&self, query: &Query) -> Result<Batch, TransportError> {
        let url = query.find_url();
        let params = query.find_params();
        let batch_size = query.batch_size();
        let transport = self.transport.clone();
        let fetched = self
            .cache
            .get_if(
                &url,
                &params,
                {
                    let url = url.clone();
                    let params = params.clone();
                    move || async move {
                        let value = transport.get_json(&url, &params).await?;
                        ensure_acknowledged(&value)?;
                        Ok(value)
                    }
                },
                move |value| results_len(value) < batch_size,
            )
            .await?;

        let batch = Batch::try_from(fetched.value)?;
        if fetched.via_cache && !batch.is_terminal(batch_size) {
            // joined a concurrent request for a full page; its cursor is taken
            tracing::debug!(url = %url, "first page is shared, requesting a fresh cursor");
            let value = self.transport.get_json(&url, &params).await?;
            return Batch::try_from(value);
        }
        Ok(batch)
    }

    async fn next_page(&self, query: &Query, cursor: &Cursor) -> Result<Batch, TransportError> {
        let value = self
            .transport
            .get_json(&query.more_url(), &query.more_params(cursor))
            .await?;
        Batch::try_from(value)
    }
}

fn results_len(value: &Value) -> usize {
    value
        .get("results")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collection_url_is_nested_under_base() {
        let client = MongooseClient::new(
            Url::parse("http://localhost:27080/").unwrap(),
            Duration::from_secs(1),
            Default::default(),
        )
        .unwrap();
        assert_eq!(
            client.collection_url("report", "daily_video_stats").unwrap().as_str(),
            "http://localhost:27080/report/daily_video_stats/"
        );
    }
}
