//! Source document download over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::backend::SourceFetcher;
use crate::error::FetchError;

const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Fetches source PDFs with a shared connection pool
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("pdf-region-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn download(&self, url: &str, max_bytes: u64) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(FetchError::TooLarge {
                    size: length,
                    max: max_bytes,
                });
            }
        }

        // Content-Length can be absent or wrong, so the limit is enforced on
        // the stream as well.
        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let size = (body.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(FetchError::TooLarge {
                    size,
                    max: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let body = body.freeze();
        if body.is_empty() {
            return Err(FetchError::Empty);
        }
        if !body.starts_with(PDF_SIGNATURE) {
            return Err(FetchError::InvalidSignature);
        }

        debug!(url = %url, bytes = body.len(), "Fetched source PDF");
        Ok(body)
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<Bytes, FetchError> {
        tokio::time::timeout(timeout, self.download(url, max_bytes))
            .await
            .map_err(|_| FetchError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
    }
}
