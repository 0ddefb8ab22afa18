//! Shared HTTP transport and status-code classification for provider clients.
//!
//! Grounded on the teacher's `providers/http_client.rs`: a thin `reqwest`
//! wrapper plus a `map_error_response` wired to this crate's own error
//! taxonomy (spec §4.1's classification table) instead of the teacher's.

use crate::error::ProviderError;
use reqwest::{header::HeaderMap, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    pub async fn post_json<TReq: Serialize + Sync, TResp: DeserializeOwned>(
        &self,
        path: &str,
        headers: HeaderMap,
        body: &TReq,
    ) -> Result<TResp, ProviderError> {
        let resp = self
            .http
            .post(self.url(path))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !resp.status().is_success() {
            return Err(classify_error_response(resp).await);
        }
        resp.json::<TResp>().await.map_err(ProviderError::Http)
    }

    pub async fn get_json<TResp: DeserializeOwned>(
        &self,
        path: &str,
        headers: HeaderMap,
    ) -> Result<TResp, ProviderError> {
        let resp = self
            .http
            .get(self.url(path))
            .headers(headers)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !resp.status().is_success() {
            return Err(classify_error_response(resp).await);
        }
        resp.json::<TResp>().await.map_err(ProviderError::Http)
    }

    /// Issue a bare GET and report only latency/success, for health probes.
    pub async fn probe(&self, path: &str, headers: HeaderMap) -> Result<(), ProviderError> {
        let resp = self
            .http
            .get(self.url(path))
            .headers(headers)
            .send()
            .await
            .map_err(classify_transport_error)?;
        if !resp.status().is_success() {
            return Err(classify_error_response(resp).await);
        }
        Ok(())
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Http(err)
    }
}

/// Maps an unsuccessful response onto spec §4.1's classification table.
pub async fn classify_error_response(resp: Response) -> ProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();

    match status {
        400 => ProviderError::BadRequest { message: body },
        401 => ProviderError::InvalidApiKey,
        402 => ProviderError::PaymentRequired,
        404 if body.to_lowercase().contains("provider") => {
            ProviderError::ProviderPreferencesIgnored
        }
        404 => ProviderError::Api {
            code: 404,
            message: body,
        },
        429 => ProviderError::RateLimit,
        502 | 503 | 504 => ProviderError::ServiceUnavailable,
        code => ProviderError::Api { code, message: body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_builds_with_base_url() {
        let t = HttpTransport::new("https://example.test", Duration::from_secs(5));
        assert!(t.is_ok());
    }
}
