//! Scoring backend client.
//!
//! Uses the curl crate (libcurl) to POST one payload per call and hand
//! back the response body as opaque JSON. Transport failures and HTTP
//! statuses are mapped onto the retry taxonomy here so the retry loop
//! never has to look at curl types.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::ServiceConfig;
use crate::retry::TaskError;

/// Client for the remote scoring endpoint. Cheap to clone per worker.
///
/// Requests are blocking; call from a worker thread (the scheduler's
/// retry loop already runs there), not from an async context.
#[derive(Debug, Clone)]
pub struct ScoreClient {
    endpoint: String,
    auth_token: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ScoreClient {
    /// Build a client from config, validating the endpoint URL up front.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let parsed = url::Url::parse(&cfg.endpoint)
            .with_context(|| format!("invalid scoring endpoint: {}", cfg.endpoint))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!(
                "scoring endpoint must be http(s), got {}",
                parsed.scheme()
            );
        }
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            auth_token: cfg.auth_token.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
        })
    }

    /// POST `payload` (plus the current recovery guidance) to the scoring
    /// endpoint and return the response body as JSON.
    ///
    /// The body's meaning is the caller's business; this only checks that
    /// it is well-formed JSON, because a scorer that answers with prose
    /// or a truncated document needs a guided retry, not a crash.
    pub fn submit(&self, payload: &str, guidance: &str) -> Result<serde_json::Value, TaskError> {
        let body = serde_json::json!({
            "input": payload,
            "guidance": guidance,
        });
        let body = serde_json::to_vec(&body)
            .map_err(|e| TaskError::unclassified(format!("request encoding: {e}")))?;

        let mut response = Vec::new();
        let mut easy = curl::easy::Easy::new();
        easy.url(&self.endpoint).map_err(transport_error)?;
        easy.post(true).map_err(transport_error)?;
        easy.post_fields_copy(&body).map_err(transport_error)?;
        easy.connect_timeout(self.connect_timeout)
            .map_err(transport_error)?;
        easy.timeout(self.request_timeout).map_err(transport_error)?;

        let mut list = curl::easy::List::new();
        list.append("Content-Type: application/json")
            .map_err(transport_error)?;
        if let Some(token) = &self.auth_token {
            list.append(&format!("Authorization: Bearer {}", token.trim()))
                .map_err(transport_error)?;
        }
        easy.http_headers(list).map_err(transport_error)?;

        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    response.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(transport_error)?;
            transfer.perform().map_err(transport_error)?;
        }

        let code = easy
            .response_code()
            .map_err(|e| TaskError::unclassified(format!("no response code: {e}")))?;
        if let Some(err) = status_error(code) {
            return Err(err);
        }

        parse_score_body(&response)
    }
}

/// Map a curl-level failure onto the retry taxonomy. An unreachable or
/// silent backend counts as a timeout (fatal); everything else is
/// unclassified.
fn transport_error(e: curl::Error) -> TaskError {
    if e.is_operation_timedout() {
        TaskError::timeout(format!("scoring request timed out: {e}"))
    } else if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_send_error()
        || e.is_recv_error()
        || e.is_got_nothing()
    {
        TaskError::timeout(format!("scoring backend unreachable: {e}"))
    } else {
        TaskError::unclassified(format!("transport failure: {e}"))
    }
}

/// Map an HTTP status onto the retry taxonomy. 429 is the backend's
/// quota signal; 503 means overloaded, which gets the same fatal
/// treatment as a timeout.
fn status_error(code: u32) -> Option<TaskError> {
    match code {
        200..=299 => None,
        429 => Some(TaskError::quota(
            "scoring backend rejected the call (HTTP 429)",
        )),
        503 => Some(TaskError::timeout(
            "scoring backend overloaded (HTTP 503)",
        )),
        _ => Some(TaskError::unclassified(format!(
            "scoring backend returned HTTP {code}"
        ))),
    }
}

/// Require a non-empty, well-formed JSON body.
fn parse_score_body(body: &[u8]) -> Result<serde_json::Value, TaskError> {
    if body.is_empty() {
        return Err(TaskError::format("scoring response body was empty"));
    }
    serde_json::from_slice(body)
        .map_err(|e| TaskError::format(format!("scoring response was not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ErrorKind;

    #[test]
    fn status_2xx_is_ok() {
        assert!(status_error(200).is_none());
        assert!(status_error(204).is_none());
    }

    #[test]
    fn status_429_is_quota() {
        assert_eq!(status_error(429).unwrap().kind(), ErrorKind::Quota);
    }

    #[test]
    fn status_503_is_timeout() {
        assert_eq!(status_error(503).unwrap().kind(), ErrorKind::Timeout);
    }

    #[test]
    fn status_other_is_unclassified() {
        assert_eq!(status_error(404).unwrap().kind(), ErrorKind::Unclassified);
        assert_eq!(status_error(500).unwrap().kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn body_must_be_json() {
        assert_eq!(
            parse_score_body(b"").unwrap_err().kind(),
            ErrorKind::Format
        );
        assert_eq!(
            parse_score_body(b"not json {").unwrap_err().kind(),
            ErrorKind::Format
        );
        let v = parse_score_body(br#"{"score": 2.5}"#).unwrap();
        assert_eq!(v["score"], 2.5);
    }

    #[test]
    fn from_config_rejects_non_http_endpoints() {
        let mut cfg = ServiceConfig::default();
        cfg.endpoint = "ftp://example.com/score".to_string();
        assert!(ScoreClient::from_config(&cfg).is_err());
        cfg.endpoint = "not a url".to_string();
        assert!(ScoreClient::from_config(&cfg).is_err());
        cfg.endpoint = "https://example.com/score".to_string();
        assert!(ScoreClient::from_config(&cfg).is_ok());
    }
}
