use crate::{error::TransportError, query::QueryParams};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Issues a single GET request and returns the decoded JSON body.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn get_json(&self, url: &Url, params: &QueryParams) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    reqwest_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http_timeout: Duration) -> Result<Self, TransportError> {
        let reqwest_client = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self { reqwest_client })
    }

    async fn process_response(response: Response) -> Result<Value, TransportError> {
        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            }
            status => Err(TransportError::UnexpectedStatus {
                status,
                body: response.text().await?,
            }),
        }
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn get_json(&self, url: &Url, params: &QueryParams) -> Result<Value, TransportError> {
        tracing::debug!(url = %url, ?params, "sending request");
        let response = self
            .reqwest_client
            .get(url.clone())
            .query(params)
            .send()
            .await?;
        Self::process_response(response).await
    }
}
