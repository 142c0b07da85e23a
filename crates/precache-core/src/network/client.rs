//! HTTP implementation of [`Network`] on top of reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::{FetchError, Network};
use crate::models::{Request, Response};

/// HTTP request timeout in seconds.
/// The worker imposes no timeout of its own; this bounds a hung connection.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        // reqwest sets Content-Length from the body actually sent.
        let mut headers = request.headers.clone();
        headers.remove(header::CONTENT_LENGTH);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: request.url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(url = %request.url, status, bytes = body.len(), "Fetched from network");
        Ok(Response::new(status, headers, body))
    }
}
