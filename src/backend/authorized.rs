use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::client::{BackendClient, BackendError, BackendReply};
use crate::backend::jwt::{is_token_expiring_soon, DEFAULT_EXPIRY_BUFFER_SECS};
use crate::backend::retry::RetryPolicy;
use crate::backend::session::{AuthData, SessionStore};

/// Backend client that signs requests with the session's access token.
///
/// Tokens close to expiry are refreshed before the call. A 401 triggers one
/// refresh through `POST /auth/refresh` and exactly one retry; if the refresh
/// fails the session is cleared.
#[derive(Clone)]
pub struct AuthorizedClient {
    backend: BackendClient,
    session: Arc<dyn SessionStore>,
    refresh_lock: Arc<Mutex<()>>,
    expiry_buffer_secs: i64,
}

impl AuthorizedClient {
    pub fn new(backend: BackendClient, session: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            session,
            refresh_lock: Arc::new(Mutex::new(())),
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }

    pub fn with_expiry_buffer(mut self, secs: i64) -> Self {
        self.expiry_buffer_secs = secs;
        self
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<BackendReply, BackendError> {
        let mut token = self.session.token().await;

        if let Some(current) = token.as_deref() {
            if is_token_expiring_soon(current, self.expiry_buffer_secs, Utc::now())
                && self.session.refresh_token().await.is_some()
            {
                match self.refresh(Some(current)).await {
                    Ok(fresh) => token = Some(fresh),
                    Err(e) => warn!(error = %e, "proactive token refresh failed"),
                }
            }
        }

        let reply = self.dispatch(&method, path, body.as_ref(), token.as_deref()).await?;
        if reply.status != 401 || token.is_none() {
            return Ok(reply);
        }

        match self.refresh(token.as_deref()).await {
            Ok(fresh) => {
                self.dispatch(&method, path, body.as_ref(), Some(&fresh))
                    .await
            }
            Err(e) => {
                warn!(error = %e, path, "token refresh after 401 failed, clearing session");
                self.session.clear().await;
                Ok(reply)
            }
        }
    }

    /// Sends and fails on any non-2xx status.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, BackendError> {
        self.send(method, path, body).await?.into_result()
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&JsonValue>,
        token: Option<&str>,
    ) -> Result<BackendReply, BackendError> {
        let mut call = self.backend.request(method.clone(), path).bearer(token);
        if let Some(payload) = body {
            call = call.json(payload.clone());
        }
        call.send().await
    }

    /// Refreshes unless another task already replaced `stale` while we waited.
    async fn refresh(&self, stale: Option<&str>) -> Result<String, BackendError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.session.token().await;
        if let Some(current) = current {
            if stale != Some(current.as_str()) {
                return Ok(current);
            }
        }

        let refresh_token = self.session.refresh_token().await.ok_or_else(|| {
            BackendError::Status {
                status: 401,
                body: json!({ "error": "No refresh token available" }),
            }
        })?;

        let reply = self
            .backend
            .post("/auth/refresh")
            .json(json!({ "refreshToken": refresh_token }))
            .send_with(&RetryPolicy::token_refresh())
            .await?;
        let body = reply.into_result()?;

        let data: AuthData = serde_json::from_value(body.get("data").cloned().unwrap_or(body))
            .map_err(|e| BackendError::Decode {
                message: e.to_string(),
            })?;
        let token = data.access_token.clone();
        self.session.set_auth(data).await;

        info!("access token refreshed");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::jwt::encode_test_token;
    use crate::backend::session::MemorySessionStore;
    use crate::config::BackendConfig;
    use httpmock::prelude::*;

    fn long_lived(sub: &str) -> String {
        encode_test_token(&json!({ "sub": sub, "exp": Utc::now().timestamp() + 86_400 }))
    }

    #[tokio::test]
    async fn test_refreshes_once_on_401() {
        let server = MockServer::start_async().await;
        let old = long_lived("old");
        let new = long_lived("new");

        let rejected = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/orders/o1")
                    .header("authorization", format!("Bearer {}", old));
                then.status(401).json_body(json!({ "error": "expired" }));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/refresh")
                    .json_body(json!({ "refreshToken": "r1" }));
                then.status(200).json_body(json!({
                    "accessToken": new.clone(),
                    "refreshToken": "r2"
                }));
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/orders/o1")
                    .header("authorization", format!("Bearer {}", new));
                then.status(200).json_body(json!({ "id": "o1" }));
            })
            .await;

        let session = Arc::new(MemorySessionStore::with_tokens(old.clone(), Some("r1".into())));
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        let client = AuthorizedClient::new(backend, session.clone());

        let body = client
            .request_json(Method::GET, "/orders/o1", None)
            .await
            .unwrap();

        assert_eq!(body["id"], "o1");
        rejected.assert_hits_async(1).await;
        refresh.assert_hits_async(1).await;
        accepted.assert_hits_async(1).await;
        assert_eq!(session.refresh_token().await.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_session() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/orders");
                then.status(401).json_body(json!({ "error": "expired" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/refresh");
                then.status(401).json_body(json!({ "error": "invalid refresh token" }));
            })
            .await;

        let session = Arc::new(MemorySessionStore::with_tokens(
            long_lived("u"),
            Some("bad".into()),
        ));
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        let client = AuthorizedClient::new(backend, session.clone());

        let err = client
            .request_json(Method::GET, "/orders", None)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Status { status: 401, .. }));
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed_before_call() {
        let server = MockServer::start_async().await;
        let expiring =
            encode_test_token(&json!({ "sub": "u", "exp": Utc::now().timestamp() + 60 }));
        let fresh = long_lived("fresh");

        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/refresh");
                then.status(200).json_body(json!({ "accessToken": fresh.clone() }));
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/orders")
                    .header("authorization", format!("Bearer {}", fresh));
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let session = Arc::new(MemorySessionStore::with_tokens(expiring, Some("r".into())));
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        let client = AuthorizedClient::new(backend, session);

        client
            .request_json(Method::GET, "/orders", None)
            .await
            .unwrap();

        refresh.assert_hits_async(1).await;
        call.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_zero_buffer_skips_proactive_refresh() {
        let server = MockServer::start_async().await;
        let expiring =
            encode_test_token(&json!({ "sub": "u", "exp": Utc::now().timestamp() + 60 }));

        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/refresh");
                then.status(200).json_body(json!({ "accessToken": "unused" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/orders")
                    .header("authorization", format!("Bearer {}", expiring));
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let session = Arc::new(MemorySessionStore::with_tokens(
            expiring.clone(),
            Some("r".into()),
        ));
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        let client = AuthorizedClient::new(backend, session).with_expiry_buffer(0);

        client
            .request_json(Method::GET, "/orders", None)
            .await
            .unwrap();

        refresh.assert_hits_async(0).await;
    }
}
