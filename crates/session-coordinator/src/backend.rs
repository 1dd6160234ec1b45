//! Authentication endpoints of the booking API.
//!
//! [`AuthBackend`] is the seam the coordinator and state controller call
//! through; [`HttpAuthBackend`] is the reqwest implementation.

use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use credential_storage::{Credential, UserProfile};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Email/password login body.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account registration body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub address: String,
    pub phone_number: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Standard response envelope of the booking API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// `success` or `error`
    #[serde(default)]
    pub status: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    /// Field-level validation errors
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() != Some("error")
    }
}

/// Auth payload shared by login, register, and refresh responses.
///
/// Refresh responses may carry only the access token; everything else is
/// optional on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id: Option<i64>,
    email: Option<String>,
    username: Option<String>,
    phone_number: Option<String>,
    address: Option<String>,
    role: Option<String>,
}

impl AuthPayload {
    fn profile(&self) -> Option<UserProfile> {
        Some(UserProfile {
            id: self.id?,
            email: self.email.clone()?,
            username: self.username.clone(),
            phone_number: self.phone_number.clone(),
            address: self.address.clone(),
            role: self.role.clone()?,
        })
    }
}

/// Envelope whose `data` key must be present (it may be null).
#[derive(Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
struct Envelope<T> {
    #[serde(deserialize_with = "Option::deserialize")]
    data: Option<T>,
}

/// Accepts both the enveloped and the bare payload shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Enveloped(Envelope<T>),
    Bare(T),
}

impl<T> Payload<T> {
    fn into_inner(self) -> Option<T> {
        match self {
            Payload::Enveloped(envelope) => envelope.data,
            Payload::Bare(inner) => Some(inner),
        }
    }
}

/// Successful renewal. Fields other than the access token are present only
/// when the backend rotated or re-sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub profile: Option<UserProfile>,
}

/// Calls to the token-issuing service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange email and password for a full credential.
    async fn login(&self, request: &LoginRequest) -> SessionResult<Credential>;

    /// Mint a new access token from a renewal token.
    ///
    /// Must return [`SessionError::AuthorizationRejected`] when the renewal
    /// token is refused (HTTP 401/403), and a transient error otherwise.
    async fn refresh(&self, refresh_token: &str) -> SessionResult<RenewalGrant>;

    /// Create an account. Does not sign in.
    async fn register(&self, request: &RegisterRequest) -> SessionResult<UserProfile>;
}

/// reqwest client for the `/auth/*` endpoints.
pub struct HttpAuthBackend {
    base_url: Url,
    client: Client,
}

impl HttpAuthBackend {
    pub fn new(base_url: Url, request_timeout: Duration) -> SessionResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: Url, client: Client) -> Self {
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an endpoint path onto the base URL, keeping the base path.
    pub(crate) fn endpoint(&self, path: &str) -> SessionResult<Url> {
        join_url(&self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> SessionResult<(u16, Option<T>, String)>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(url = %url, "Calling auth endpoint");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_transport)?;

        if !(200..300).contains(&status) {
            return Ok((status, None, text));
        }

        let parsed: Payload<T> = serde_json::from_str(&text)
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok((status, parsed.into_inner(), text))
    }
}

pub(crate) fn join_url(base: &Url, path: &str) -> SessionResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

pub(crate) fn classify_transport(e: reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::Timeout
    } else if e.is_connect() || e.is_request() {
        SessionError::Transport(e.to_string())
    } else {
        SessionError::Http(e)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> SessionResult<Credential> {
        let (status, payload, body) = self
            .post_json::<_, AuthPayload>("auth/login", request)
            .await?;

        if !(200..300).contains(&status) {
            warn!(status, email = %request.email, "Login failed");
            return Err(if SessionError::is_authorization_status(status) || status == 400 {
                SessionError::InvalidCredentials(format!("HTTP {}: {}", status, body))
            } else {
                SessionError::UnexpectedStatus { status, body }
            });
        }

        let payload = payload
            .ok_or_else(|| SessionError::MalformedResponse("login response has no data".into()))?;
        let profile = payload.profile();
        let (Some(access_token), Some(refresh_token)) = (payload.access_token, payload.refresh_token)
        else {
            return Err(SessionError::MalformedResponse(
                "login response is missing tokens".to_string(),
            ));
        };

        info!(email = %request.email, "Login successful");
        Ok(Credential {
            access_token,
            refresh_token,
            profile,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<RenewalGrant> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let (status, payload, text) = self
            .post_json::<_, AuthPayload>("auth/refresh", &body)
            .await?;

        if SessionError::is_authorization_status(status) {
            warn!(status, "Renewal token rejected");
            return Err(SessionError::AuthorizationRejected { status });
        }
        if !(200..300).contains(&status) {
            warn!(status, body = %text, "Token refresh failed");
            return Err(SessionError::UnexpectedStatus { status, body: text });
        }

        let payload = payload.ok_or_else(|| {
            SessionError::MalformedResponse("refresh response has no data".to_string())
        })?;
        let profile = payload.profile();
        let access_token = payload.access_token.ok_or_else(|| {
            SessionError::MalformedResponse("refresh response has no accessToken".to_string())
        })?;

        Ok(RenewalGrant {
            access_token,
            refresh_token: payload.refresh_token,
            profile,
        })
    }

    async fn register(&self, request: &RegisterRequest) -> SessionResult<UserProfile> {
        let (status, payload, body) = self
            .post_json::<_, AuthPayload>("auth/register", request)
            .await?;

        if !(200..300).contains(&status) {
            warn!(status, email = %request.email, "Registration failed");
            return Err(SessionError::UnexpectedStatus { status, body });
        }

        payload.and_then(|p| p.profile()).ok_or_else(|| {
            SessionError::MalformedResponse("register response has no profile".to_string())
        })
    }
}
