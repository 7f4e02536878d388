use std::{future::Future, time::Duration};

use reqwest::Client;
use surge::{check::ResponseInfo, metric::ErrorKind};
use thiserror::Error;
use tokio::time::Instant;

use crate::payload::PostRequest;

/// A request that produced no response.
#[derive(Debug, Error)]
#[error("{kind} error after {elapsed:?}: {source}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub elapsed: Duration,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Sends a [`PostRequest`] and reports what came back.
///
/// The latency in the returned [`ResponseInfo`] covers the whole exchange,
/// including reading the response body.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: PostRequest,
    ) -> impl Future<Output = Result<ResponseInfo, TransportError>> + Send;
}

/// [`Transport`] over a shared, pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: PostRequest) -> Result<ResponseInfo, TransportError> {
        let start = Instant::now();
        let fail = |kind: ErrorKind, source: Box<dyn std::error::Error + Send + Sync>| {
            TransportError {
                kind,
                elapsed: start.elapsed(),
                source,
            }
        };

        let body = request
            .body()
            .map_err(|e| fail(ErrorKind::Request, Box::new(e)))?;

        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(body)
            .send()
            .await
            .map_err(|e| fail(classify(&e), Box::new(e)))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fail(classify(&e), Box::new(e)))?;

        Ok(ResponseInfo {
            status,
            latency: start.elapsed(),
            bytes: bytes.len() as u64,
        })
    }
}

fn classify(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_connect() {
        ErrorKind::Connect
    } else if e.is_body() || e.is_decode() {
        ErrorKind::Body
    } else {
        ErrorKind::Request
    }
}
