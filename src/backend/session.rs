//! Injected auth session: the access/refresh tokens and the signed-in user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppRole {
    Admin,
    User,
    Rider,
    Manager,
    Staff,
    StockManager,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub roles: Vec<AppRole>,
}

/// Payload of `POST /auth/refresh` and the login endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: Option<AuthUser>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn token(&self) -> Option<String>;

    async fn set_token(&self, token: Option<String>);

    async fn refresh_token(&self) -> Option<String>;

    async fn set_refresh_token(&self, token: Option<String>);

    async fn user(&self) -> Option<AuthUser>;

    async fn set_auth(&self, data: AuthData);

    async fn clear(&self);

    async fn has_role(&self, role: &AppRole) -> bool {
        self.user()
            .await
            .map(|u| u.roles.contains(role))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    refresh_token: Option<String>,
    user: Option<AuthUser>,
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: RwLock<SessionState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            state: RwLock::new(SessionState {
                token: Some(token.into()),
                refresh_token,
                user: None,
            }),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    async fn set_token(&self, token: Option<String>) {
        self.state.write().await.token = token;
    }

    async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    async fn set_refresh_token(&self, token: Option<String>) {
        self.state.write().await.refresh_token = token;
    }

    async fn user(&self) -> Option<AuthUser> {
        self.state.read().await.user.clone()
    }

    async fn set_auth(&self, data: AuthData) {
        let mut state = self.state.write().await;
        state.token = Some(data.access_token);
        if data.refresh_token.is_some() {
            state.refresh_token = data.refresh_token;
        }
        if data.user.is_some() {
            state.user = data.user;
        }
    }

    async fn clear(&self) {
        *self.state.write().await = SessionState::default();
    }
}
