// Authentication gateway: remote credential exchange + room list endpoint.

use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::credentials::Identity;
use crate::state::RoomSummary;

/// Successful credential exchange: the identity record plus the session
/// token proving authentication with the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResult {
    pub user_id: String,
    pub email: String,
    pub chat_username: Option<String>,
    pub chat_password: Option<String>,
    pub token: String,
}

impl AuthResult {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user_id.clone(),
            email: self.email.clone(),
            chat_username: self.chat_username.clone(),
            chat_password: self.chat_password.clone(),
            token: Some(self.token.clone()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("network failure: {0}")]
    Network(String),
    #[error("server error (status {status})")]
    Server { status: u16 },
}

/// Stateless credential exchange. No retries here; retry policy belongs to
/// the caller. Implementations must not touch the credential store — the
/// session core commits results itself, keeping "fetch" and "commit" apart.
pub trait AuthGateway: Send + Sync + 'static {
    fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> BoxFuture<'static, Result<AuthResult, AuthError>>;

    /// Room list for the authenticated user. The session core only calls this
    /// once a session is live (authenticated AND connected).
    fn list_rooms(&self, token: &str) -> BoxFuture<'static, Result<Vec<RoomSummary>, AuthError>>;
}

/// Swappable gateway slot. Tests install fakes through
/// `App::set_auth_gateway_for_tests`.
pub type SharedAuthGateway = Arc<RwLock<Arc<dyn AuthGateway>>>;

/// Production gateway: JSON over HTTPS against the configured auth backend.
pub struct HttpAuthGateway {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpAuthGateway {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::Network(format!("bad endpoint {path}: {e}")))
    }
}

fn status_error(status: reqwest::StatusCode) -> AuthError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        AuthError::InvalidCredentials
    } else {
        AuthError::Server {
            status: status.as_u16(),
        }
    }
}

impl AuthGateway for HttpAuthGateway {
    fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> BoxFuture<'static, Result<AuthResult, AuthError>> {
        let http = self.http.clone();
        let url = self.endpoint("auth/login");
        let body = serde_json::json!({ "email": email, "password": password });
        Box::pin(async move {
            let resp = http
                .post(url?)
                .json(&body)
                .send()
                .await
                .map_err(|e| AuthError::Network(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(status_error(status));
            }
            resp.json::<AuthResult>()
                .await
                .map_err(|e| AuthError::Network(format!("malformed login response: {e}")))
        })
    }

    fn list_rooms(&self, token: &str) -> BoxFuture<'static, Result<Vec<RoomSummary>, AuthError>> {
        let http = self.http.clone();
        let url = self.endpoint("rooms");
        let token = token.to_string();
        Box::pin(async move {
            let resp = http
                .get(url?)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| AuthError::Network(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(status_error(status));
            }
            resp.json::<Vec<RoomSummary>>()
                .await
                .map_err(|e| AuthError::Network(format!("malformed rooms response: {e}")))
        })
    }
}
