use axum::body::Bytes;
use reqwest::{Client, Method, Url};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::backend::retry::{Retryable, RetryPolicy};
use crate::config::BackendConfig;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend request failed: {message}")]
    Transport { message: String, timeout: bool },

    #[error("invalid backend JSON response: {message}")]
    Decode { message: String },

    #[error("backend responded with HTTP {status}")]
    Status { status: u16, body: JsonValue },
}

impl BackendError {
    fn transport(err: reqwest::Error) -> Self {
        BackendError::Transport {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl Retryable for BackendError {
    fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transport { .. })
    }
}

/// `message`, then `error`, when either is a non-empty string.
pub fn message_from(body: &JsonValue) -> Option<String> {
    ["message", "error"].iter().find_map(|field| {
        body.get(*field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    })
}

/// Status and parsed JSON body of a completed backend call.
///
/// Non-2xx statuses are still a reply; only transport and decode failures
/// are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: u16,
    pub body: JsonValue,
}

impl BackendReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn message_or(&self, default: &str) -> String {
        message_from(&self.body).unwrap_or_else(|| default.to_string())
    }

    /// `body.data` when present, otherwise the whole body
    pub fn data(&self) -> &JsonValue {
        match self.body.get("data") {
            Some(data) if !data.is_null() => data,
            _ => &self.body,
        }
    }

    pub fn into_result(self) -> Result<JsonValue, BackendError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(BackendError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

#[derive(Clone)]
enum CallBody {
    Json(JsonValue),
    RawJson(Bytes),
}

/// Client for the Nihemart backend REST API rooted at `API_BASE`.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Transport {
                message: format!("failed to initialize HTTP client: {}", e),
                timeout: false,
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> BackendCall {
        BackendCall {
            http: self.http.clone(),
            method,
            url: self.url(path),
            bearer: None,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(&self, path: &str) -> BackendCall {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> BackendCall {
        self.request(Method::POST, path)
    }

    pub fn patch(&self, path: &str) -> BackendCall {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> BackendCall {
        self.request(Method::DELETE, path)
    }
}

/// A single backend request under construction.
#[derive(Clone)]
pub struct BackendCall {
    http: Client,
    method: Method,
    url: String,
    bearer: Option<String>,
    body: Option<CallBody>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl BackendCall {
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.filter(|t| !t.is_empty()).map(|t| t.to_string());
        self
    }

    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(CallBody::Json(body));
        self
    }

    /// Forward bytes untouched with `content-type: application/json`.
    pub fn raw_json(mut self, body: Bytes) -> Self {
        self.body = Some(CallBody::RawJson(body));
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn target(&self) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.url).map_err(|e| BackendError::Transport {
            message: format!("invalid backend URL {}: {}", self.url, e),
            timeout: false,
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Performs the call and returns the status with the raw body text.
    pub async fn send_text(&self) -> Result<(u16, String), BackendError> {
        let mut request = self.http.request(self.method.clone(), self.target()?);

        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        for (k, v) in &self.headers {
            request = request.header(k.as_str(), v.as_str());
        }
        match &self.body {
            Some(CallBody::Json(payload)) => request = request.json(payload),
            Some(CallBody::RawJson(bytes)) => {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(bytes.clone())
            }
            None => {}
        }

        let response = request.send().await.map_err(BackendError::transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(BackendError::transport)?;

        debug!(method = %self.method, url = %self.url, status, "backend call completed");
        Ok((status, text))
    }

    /// Performs the call and parses the body as JSON. An unparseable body is
    /// an error on 2xx and `null` otherwise.
    pub async fn send(&self) -> Result<BackendReply, BackendError> {
        let (status, text) = self.send_text().await?;

        let body = if text.trim().is_empty() {
            JsonValue::Null
        } else {
            match serde_json::from_str::<JsonValue>(&text) {
                Ok(value) => value,
                Err(e) if (200..300).contains(&status) => {
                    return Err(BackendError::Decode {
                        message: e.to_string(),
                    })
                }
                Err(_) => JsonValue::Null,
            }
        };

        Ok(BackendReply { status, body })
    }

    /// Like [`send`](Self::send) but retried under `policy`. Once the budget
    /// is spent the last non-2xx reply is returned as-is.
    pub async fn send_with(&self, policy: &RetryPolicy) -> Result<BackendReply, BackendError> {
        let outcome = policy
            .execute(|_| async move { self.send().await?.into_checked() })
            .await;

        match outcome {
            Ok(reply) => Ok(reply),
            Err(BackendError::Status { status, body }) => Ok(BackendReply { status, body }),
            Err(other) => Err(other),
        }
    }
}

impl BackendReply {
    fn into_checked(self) -> Result<BackendReply, BackendError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BackendError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_from_prefers_message() {
        assert_eq!(
            message_from(&json!({ "message": "m", "error": "e" })),
            Some("m".to_string())
        );
        assert_eq!(
            message_from(&json!({ "message": "", "error": "e" })),
            Some("e".to_string())
        );
        assert_eq!(message_from(&json!({ "error": { "code": 1 } })), None);
        assert_eq!(message_from(&JsonValue::Null), None);
    }

    #[test]
    fn test_reply_data_falls_back_to_body() {
        let reply = BackendReply {
            status: 200,
            body: json!({ "data": { "id": "p1" } }),
        };
        assert_eq!(reply.data(), &json!({ "id": "p1" }));

        let reply = BackendReply {
            status: 200,
            body: json!({ "id": "p2" }),
        };
        assert_eq!(reply.data()["id"], "p2");
    }

    #[test]
    fn test_url_joining() {
        let client = BackendClient::new(&BackendConfig::new("http://localhost:4000/api/")).unwrap();
        assert_eq!(
            client.url("/payments/status"),
            "http://localhost:4000/api/payments/status"
        );
        assert_eq!(client.url("orders"), "http://localhost:4000/api/orders");
    }

    #[test]
    fn test_query_is_encoded() {
        let client = BackendClient::new(&BackendConfig::new("http://localhost:4000/api")).unwrap();
        let call = client
            .get("payments")
            .query("status", "completed")
            .query_opt("from", None)
            .query_opt("to", Some("2024-01-01T00:00:00Z"));
        let url = call.target().unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4000/api/payments?status=completed&to=2024-01-01T00%3A00%3A00Z"
        );
    }
}
