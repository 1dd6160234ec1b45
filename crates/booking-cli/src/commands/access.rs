//! Route checks and authenticated API calls.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use serde::Serialize;
use session_coordinator::{
    AccessDecision, AccessPolicy, ApiRequest, Method, PrivilegedRouteGuard, RequestGateway,
    ReqwestTransport,
};
use std::fmt;
use std::sync::Arc;

#[derive(Serialize)]
struct GuardReport<'a> {
    path: &'a str,
    #[serde(flatten)]
    decision: &'a AccessDecision,
}

impl fmt::Display for GuardReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decision {
            AccessDecision::Authorized { role, .. } => write!(
                f,
                "{} authorized (role: {})",
                self.path,
                role.as_deref().unwrap_or("none")
            ),
            AccessDecision::Denied(denial) => {
                writeln!(f, "{} denied", self.path)?;
                write!(f, "{}", denial.message)
            }
        }
    }
}

/// Check a route the way the app's route guards do.
pub async fn guard(
    context: &Context,
    path: &str,
    any_role: bool,
    format: &OutputFormat,
) -> Result<()> {
    let policy = if any_role {
        AccessPolicy::authenticated()
    } else {
        AccessPolicy::admin(context.config.admin_role.clone())
    };

    let guard = PrivilegedRouteGuard::new(context.coordinator.clone(), policy);
    let decision = guard.ensure_fresh_then_authorize(path).await?;
    output::print(
        &GuardReport {
            path,
            decision: &decision,
        },
        format,
    );

    if !decision.is_authorized() {
        std::process::exit(2);
    }
    Ok(())
}

#[derive(Serialize)]
struct ResponseReport {
    status: u16,
    body: serde_json::Value,
}

impl fmt::Display for ResponseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HTTP {}", self.status)?;
        match &self.body {
            serde_json::Value::String(text) => write!(f, "{}", text),
            body => write!(
                f,
                "{}",
                serde_json::to_string_pretty(body).unwrap_or_default()
            ),
        }
    }
}

/// Send an authenticated request, renewing the token once on 401.
pub async fn request(
    context: &Context,
    method: &str,
    path: &str,
    body: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        let body = serde_json::from_str(body).context("Request body is not valid JSON")?;
        request = request.with_body(body);
    }

    let transport = Arc::new(ReqwestTransport::new(context.config.request_timeout())?);
    let gateway = RequestGateway::new(
        context.coordinator.clone(),
        transport,
        context.config.api_base_url()?,
    );

    let response = gateway.send(&request).await?;
    let body = serde_json::from_str(&response.body)
        .unwrap_or(serde_json::Value::String(response.body.clone()));
    output::print(
        &ResponseReport {
            status: response.status,
            body,
        },
        format,
    );

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
