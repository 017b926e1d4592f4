//! NCEI archive of NAM analysis files.
//!
//! Daily directory listings live under `{BASE}/{yyyymm}/{yyyymmdd}/` and hold one
//! GRIB file per analysis cycle, e.g. `namanl_218_20190101_0000_000.grb2`.

use crate::config::HttpSettings;
use crate::retry::{with_retry, RetryConfig, RetryError};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Non-success HTTP status of a request.
#[derive(Debug, Error)]
#[error("HTTP status {0}")]
pub struct HttpStatus(pub reqwest::StatusCode);

pub struct NamSource {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl NamSource {
    pub fn new(settings: &HttpSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::from(settings),
        })
    }

    /// Build the listing URL for a day.
    ///
    /// URL format: `{BASE}/{yyyymm}/{yyyymmdd}`
    pub fn listing_url(&self, date: NaiveDate) -> String {
        build_listing_url(&self.base_url, date)
    }

    /// Fetch the listing page of a day. Returns Ok(None) on a non-success status.
    pub async fn fetch_listing(&self, date: NaiveDate) -> anyhow::Result<Option<String>> {
        let listing = self.listing_url(date);
        let url = listing.as_str();
        let result = with_retry(
            || async move {
                let response = self.send(url).await?;
                response
                    .text()
                    .await
                    .map_err(|e| RetryError::Retryable(e.into()))
            },
            &self.retry,
        )
        .await;

        match result {
            Ok(page) => Ok(Some(page)),
            Err(err) => {
                let err = err.into_inner();
                match err.downcast_ref::<HttpStatus>() {
                    Some(status) => {
                        log::debug!("Listing {} skipped: {}", url, status);
                        Ok(None)
                    }
                    None => Err(err.context(format!("Failed to fetch {}", url))),
                }
            }
        }
    }

    /// Download a file into a temporary file in `dir`, deleted when dropped.
    pub async fn download(
        &self,
        url: &str,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> Result<NamedTempFile, RetryError> {
        with_retry(
            || async move {
                let response = self.send(url).await?;
                let content_length = response.content_length();

                let mut tmp = tempfile::Builder::new()
                    .prefix(prefix)
                    .suffix(suffix)
                    .tempfile_in(dir)
                    .map_err(|e| RetryError::NonRetryable(e.into()))?;

                let mut stream = response.bytes_stream();
                let mut total: u64 = 0;
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| RetryError::Retryable(e.into()))?;
                    total += chunk.len() as u64;
                    tmp.write_all(&chunk)
                        .map_err(|e| RetryError::NonRetryable(e.into()))?;
                }
                tmp.flush()
                    .map_err(|e| RetryError::NonRetryable(e.into()))?;

                if let Some(expected) = content_length {
                    if expected != total {
                        return Err(RetryError::Retryable(anyhow!(
                            "Truncated download: {} of {} bytes",
                            total,
                            expected
                        )));
                    }
                }
                log::debug!("Downloaded {} ({} KB)", url, total / 1024);
                Ok(tmp)
            },
            &self.retry,
        )
        .await
    }

    /// Single GET, classifying failures for the retry loop.
    async fn send(&self, url: &str) -> Result<reqwest::Response, RetryError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetryError::Retryable(anyhow::Error::new(e).context("Failed to send request")))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(RetryError::Retryable(HttpStatus(status).into()))
        } else {
            Err(RetryError::NonRetryable(HttpStatus(status).into()))
        }
    }
}

pub fn build_listing_url(base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/{}",
        base_url,
        date.format("%Y%m"),
        date.format("%Y%m%d")
    )
}
