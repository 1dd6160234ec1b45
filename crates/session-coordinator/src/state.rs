//! Per-surface view of the session.
//!
//! Each UI surface (or CLI command) owns a [`SessionStateController`]. All of
//! them share one [`RefreshCoordinator`], and stay in sync by re-reading the
//! credential store whenever the session bus reports a renewal or a clear.

use crate::backend::{LoginRequest, RegisterRequest};
use crate::codec::CredentialCodec;
use crate::clock::Clock;
use crate::events::{ClearReason, SessionEvent, Subscription};
use crate::refresh::RefreshCoordinator;
use crate::SessionResult;
use credential_storage::{CredentialStore, IntendedPathSlot, UserProfile};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What a surface renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub profile: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub profile: Option<UserProfile>,
    /// Where to navigate next
    pub resume_path: String,
}

pub struct SessionStateController {
    coordinator: RefreshCoordinator,
    admin_role: String,
    state: Arc<watch::Sender<SessionSnapshot>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionStateController {
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            coordinator,
            admin_role: "ADMIN".to_string(),
            state: Arc::new(state),
            subscription: Mutex::new(None),
        }
    }

    /// Role that resumes into the admin area after login.
    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = role.into();
        self
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that observes every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    fn store(&self) -> &Arc<CredentialStore> {
        self.coordinator.store()
    }

    /// Load the stored session and start following bus events.
    ///
    /// A credential whose access token has already expired is cleared rather
    /// than restored.
    pub fn activate(&self) -> SessionResult<SessionSnapshot> {
        self.state.send_modify(|s| s.is_loading = true);

        let result = self.restore();
        self.attach();
        let snapshot = self.rederive();
        result.map(|_| snapshot)
    }

    fn restore(&self) -> SessionResult<()> {
        let Some(credential) = self.store().credential()? else {
            debug!("No stored session");
            return Ok(());
        };

        let now = self.coordinator.clock().now();
        if CredentialCodec::decode(&credential.access_token).is_expired(now) {
            info!("Stored access token expired, clearing session");
            self.store().clear_credential()?;
            self.coordinator.bus().publish(&SessionEvent::CredentialCleared {
                reason: ClearReason::Expired,
            });
            return Ok(());
        }

        self.coordinator.start();
        Ok(())
    }

    fn attach(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }

        let state = Arc::downgrade(&self.state);
        let store = self.store().clone();
        let clock = self.coordinator.clock().clone();
        *subscription = Some(self.coordinator.bus().subscribe(move |event| {
            let Some(state) = state.upgrade() else {
                return;
            };
            debug!(event = event.name(), "Re-deriving session state");
            state.send_replace(derive_snapshot(&store, clock.as_ref()));
        }));
    }

    /// Stop following bus events. Also happens on drop.
    pub fn deactivate(&self) {
        if self.subscription.lock().take().is_some() {
            debug!("Session state controller deactivated");
        }
    }

    fn rederive(&self) -> SessionSnapshot {
        let snapshot = derive_snapshot(self.store(), self.coordinator.clock().as_ref());
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    /// Sign in, persist the credential, and start proactive refresh.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<LoginOutcome> {
        self.state.send_modify(|s| s.is_loading = true);

        let result = self.login_inner(email, password).await;
        self.rederive();
        result
    }

    async fn login_inner(&self, email: &str, password: &str) -> SessionResult<LoginOutcome> {
        let request = LoginRequest::new(email, password);
        let credential = self.coordinator.backend().login(&request).await?;
        self.store().save_credential(&credential)?;
        self.coordinator.start();

        let role = credential
            .profile
            .as_ref()
            .map(|p| p.role.clone())
            .or_else(|| {
                CredentialCodec::decode(&credential.access_token)
                    .role()
                    .map(str::to_string)
            });
        let slot = if role.as_deref() == Some(self.admin_role.as_str()) {
            IntendedPathSlot::Admin
        } else {
            IntendedPathSlot::Booking
        };
        let resume_path = match self.store().take_intended_path(slot) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Could not read intended path, using default");
                None
            }
        }
        .unwrap_or_else(|| slot.fallback_path().to_string());

        info!(email, role = ?role, resume_path = %resume_path, "Signed in");
        Ok(LoginOutcome {
            profile: credential.profile,
            resume_path,
        })
    }

    /// Stop refreshing, clear the stored session, and notify every surface.
    pub fn logout(&self) -> SessionResult<()> {
        self.coordinator.stop();
        let result = self.store().clear_credential();
        if let Err(e) = &result {
            warn!(error = %e, "Session not fully cleared");
        }

        self.coordinator.bus().publish(&SessionEvent::CredentialCleared {
            reason: ClearReason::Logout,
        });
        self.rederive();
        info!("Signed out");
        result.map_err(Into::into)
    }

    /// Create an account. The new user still has to sign in.
    pub async fn register(&self, request: &RegisterRequest) -> SessionResult<UserProfile> {
        let profile = self.coordinator.backend().register(request).await?;
        info!(email = %profile.email, "Account registered");
        Ok(profile)
    }
}

fn derive_snapshot(store: &CredentialStore, clock: &dyn Clock) -> SessionSnapshot {
    match store.credential() {
        Ok(Some(credential)) => {
            let is_authenticated =
                !CredentialCodec::decode(&credential.access_token).is_expired(clock.now());
            SessionSnapshot {
                profile: credential.profile,
                is_authenticated,
                is_loading: false,
            }
        }
        Ok(None) => SessionSnapshot::default(),
        Err(e) => {
            warn!(error = %e, "Could not read session, treating as signed out");
            SessionSnapshot::default()
        }
    }
}
