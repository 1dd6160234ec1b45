//! Authenticated calls to the booking API.
//!
//! [`RequestGateway`] attaches the stored access token and, when the backend
//! answers 401, renews it through the coordinator and retries once. It never
//! refreshes ahead of time; that is the coordinator's schedule.

use crate::backend::{classify_transport, join_url, ApiResponse};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const UNAUTHORIZED: u16 = 401;

/// A call relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Fully resolved request handed to the transport.
#[derive(Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundResponse {
    pub status: u16,
    pub body: String,
}

impl InboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one HTTP request. No retries, no auth logic.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> SessionResult<InboundResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> SessionResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> SessionResult<InboundResponse> {
        let mut builder = self.client.request(request.method, request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_transport)?;
        Ok(InboundResponse { status, body })
    }
}

pub struct RequestGateway {
    coordinator: RefreshCoordinator,
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
}

impl RequestGateway {
    pub fn new(
        coordinator: RefreshCoordinator,
        transport: Arc<dyn HttpTransport>,
        base_url: Url,
    ) -> Self {
        Self {
            coordinator,
            transport,
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send `request` with the current access token.
    ///
    /// A 401 triggers one refresh and one retry; the retry's response is
    /// returned whatever its status. If the refresh does not renew the token
    /// the call fails with [`SessionError::RequestUnauthorized`]. Every other
    /// status is returned as is.
    pub async fn send(&self, request: &ApiRequest) -> SessionResult<InboundResponse> {
        let request_id = Uuid::new_v4();
        let url = join_url(&self.base_url, &request.path)?;
        let token = self.coordinator.store().access_token()?;

        let response = self.dispatch(request, &url, token, request_id).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        info!(
            request_id = %request_id,
            path = %request.path,
            "Request unauthorized, refreshing access token"
        );

        match self.coordinator.refresh().await {
            RefreshOutcome::Renewed { access_token } => {
                let retried = self
                    .dispatch(request, &url, Some(access_token), request_id)
                    .await?;
                debug!(request_id = %request_id, status = retried.status, "Retried request");
                Ok(retried)
            }
            outcome => {
                warn!(
                    request_id = %request_id,
                    path = %request.path,
                    outcome = outcome.label(),
                    "Could not renew access token for request"
                );
                Err(SessionError::RequestUnauthorized {
                    status: UNAUTHORIZED,
                })
            }
        }
    }

    /// Send and decode the API's response envelope.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> SessionResult<ApiResponse<T>> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(SessionError::UnexpectedStatus {
                status: response.status,
                body: response.body,
            });
        }

        serde_json::from_str(&response.body)
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &Url,
        bearer: Option<String>,
        request_id: Uuid,
    ) -> SessionResult<InboundResponse> {
        debug!(
            request_id = %request_id,
            method = %request.method,
            url = %url,
            authenticated = bearer.is_some(),
            "Sending API request"
        );

        self.transport
            .execute(OutboundRequest {
                method: request.method.clone(),
                url: url.clone(),
                bearer,
                body: request.body.clone(),
            })
            .await
    }
}
