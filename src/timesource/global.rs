use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{TimeMode, TimeSource};
use crate::errors::{Result, SeshatError};

/// A remote timestamp oracle reached over HTTP.
#[derive(Debug, Clone)]
pub struct GlobalTimeSource {
    url: String,
    client: reqwest::Client,
}

impl GlobalTimeSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(1))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl TimeSource for GlobalTimeSource {
    async fn get_time(&self, mode: TimeMode) -> Result<i64> {
        let response = self
            .client
            .get(format!("{}/timestamp/{}", self.url, mode.as_str()))
            .send()
            .await
            .map_err(|e| SeshatError::OracleUnavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SeshatError::OracleUnavailable(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(SeshatError::OracleUnavailable(format!(
                "{} answered {status}: {}",
                self.url,
                body.trim()
            )));
        }
        body.trim()
            .parse::<i64>()
            .map_err(|e| SeshatError::OracleUnavailable(format!("bad timestamp {body:?}: {e}")))
    }
}
