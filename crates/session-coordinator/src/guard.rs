//! Route access checks that renew the token before judging the role.
//!
//! A role check on a token that is about to expire could authorize a screen
//! whose first request then fails. [`PrivilegedRouteGuard`] therefore refreshes
//! first (through the coordinator's single flight) and only then looks at the
//! role.

use crate::clock::Clock;
use crate::codec::CredentialCodec;
use crate::events::SessionEvent;
use crate::fsm::{AccessInput, AccessMachine};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::SessionResult;
use credential_storage::{IntendedPathSlot, UserProfile};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const ADMIN_REQUIRED_MESSAGE: &str =
    "You need to sign in with an administrator account to access this page.";

/// Who may pass a guard, and where a denied path is remembered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Role the token must carry; `None` admits any signed-in user
    pub required_role: Option<String>,
    pub slot: IntendedPathSlot,
}

impl AccessPolicy {
    pub fn admin(role: impl Into<String>) -> Self {
        Self {
            required_role: Some(role.into()),
            slot: IntendedPathSlot::Admin,
        }
    }

    pub fn authenticated() -> Self {
        Self {
            required_role: None,
            slot: IntendedPathSlot::Booking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    NoCredential,
    /// Renewal did not produce a usable token
    RefreshFailed,
    /// Signed in, but without the required role. The session is kept.
    InsufficientRole { role: Option<String> },
}

impl DenialReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::NoCredential => "Please sign in to continue.",
            DenialReason::RefreshFailed => "Your session has expired. Please sign in again.",
            DenialReason::InsufficientRole { .. } => ADMIN_REQUIRED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenialReason,
    /// Path recorded for the next login
    pub intended_path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Authorized {
        role: Option<String>,
        profile: Option<UserProfile>,
    },
    Denied(Denial),
}

impl AccessDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessDecision::Authorized { .. })
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            AccessDecision::Denied(denial) => Some(denial),
            AccessDecision::Authorized { .. } => None,
        }
    }
}

pub struct PrivilegedRouteGuard {
    coordinator: RefreshCoordinator,
    policy: AccessPolicy,
}

impl PrivilegedRouteGuard {
    pub fn new(coordinator: RefreshCoordinator, policy: AccessPolicy) -> Self {
        Self {
            coordinator,
            policy,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide whether `path` may be shown, renewing a near-expiry token first.
    ///
    /// If a renewal lands while the decision is pending, the evaluation starts
    /// over against the new token. Any refresh it needs joins the attempt
    /// already in flight.
    pub async fn ensure_fresh_then_authorize(&self, path: &str) -> SessionResult<AccessDecision> {
        let renewed = Arc::new(Notify::new());
        let notify = renewed.clone();
        let _subscription = self.coordinator.bus().subscribe(move |event| {
            if matches!(event, SessionEvent::CredentialRenewed { .. }) {
                notify.notify_one();
            }
        });

        loop {
            tokio::select! {
                biased;
                decision = self.evaluate(path) => return decision,
                _ = renewed.notified() => {
                    debug!(path, "Credential renewed during route check, re-evaluating");
                }
            }
        }
    }

    async fn evaluate(&self, path: &str) -> SessionResult<AccessDecision> {
        let mut machine = AccessMachine::new();
        let store = self.coordinator.store();
        let clock = self.coordinator.clock();

        let Some(credential) = store.credential()? else {
            advance(&mut machine, AccessInput::NoCredential, path);
            return Ok(self.deny(path, DenialReason::NoCredential));
        };

        let threshold = self.coordinator.settings().refresh_threshold;
        let mut access_token = credential.access_token;
        if CredentialCodec::decode(&access_token).expires_within(clock.now(), threshold) {
            advance(&mut machine, AccessInput::NearExpiry, path);

            match self.coordinator.refresh().await {
                RefreshOutcome::Renewed { access_token: renewed }
                    if !CredentialCodec::decode(&renewed).is_expired(clock.now()) =>
                {
                    advance(&mut machine, AccessInput::RefreshSucceeded, path);
                    access_token = renewed;
                }
                outcome => {
                    debug!(path, outcome = outcome.label(), "Refresh did not yield a usable token");
                    advance(&mut machine, AccessInput::RefreshFailed, path);
                    return Ok(self.deny(path, DenialReason::RefreshFailed));
                }
            }
        } else {
            advance(&mut machine, AccessInput::Fresh, path);
        }

        let profile = store.profile()?;
        let role = CredentialCodec::decode(&access_token)
            .role()
            .map(str::to_string)
            .or_else(|| profile.as_ref().map(|p| p.role.clone()));

        let accepted = match &self.policy.required_role {
            Some(required) => role.as_deref() == Some(required.as_str()),
            None => true,
        };
        if !accepted {
            advance(&mut machine, AccessInput::RoleRejected, path);
            return Ok(self.deny(path, DenialReason::InsufficientRole { role }));
        }

        advance(&mut machine, AccessInput::RoleAccepted, path);
        debug!(path, role = ?role, "Route access granted");
        Ok(AccessDecision::Authorized { role, profile })
    }

    fn deny(&self, path: &str, reason: DenialReason) -> AccessDecision {
        if let Err(e) = self
            .coordinator
            .store()
            .set_intended_path(self.policy.slot, path)
        {
            warn!(path, error = %e, "Could not record intended path");
        }

        info!(path, reason = ?reason, "Route access denied");
        AccessDecision::Denied(Denial {
            message: reason.message().to_string(),
            reason,
            intended_path: path.to_string(),
        })
    }
}

fn advance(machine: &mut AccessMachine, input: AccessInput, path: &str) {
    let old_state = machine.state().clone();
    match machine.consume(&input) {
        Ok(_) => debug!(
            path,
            old_state = ?old_state,
            new_state = ?machine.state(),
            "Route access transition"
        ),
        Err(_) => warn!(path, state = ?old_state, input = ?input, "Invalid route access transition"),
    }
}
