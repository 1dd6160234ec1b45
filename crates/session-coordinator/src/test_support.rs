//! Fixtures shared by the unit tests.

use crate::backend::{AuthBackend, LoginRequest, RegisterRequest, RenewalGrant};
use crate::clock::{Clock, MonotonicClock};
use crate::codec::{ClaimSet, CredentialCodec};
use crate::events::{SessionEvent, SessionEventBus, Subscription};
use crate::refresh::{RefreshCoordinator, RefreshSettings};
use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use credential_storage::{
    Credential, CredentialStore, MemoryStorage, StorageBackend, UserProfile,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const ORIGIN_SECS: i64 = 1_700_000_000;

/// Clock pinned to a whole-second origin. Create inside the runtime.
pub(crate) fn test_clock() -> Arc<MonotonicClock> {
    Arc::new(MonotonicClock::starting_at(
        Utc.timestamp_opt(ORIGIN_SECS, 0).unwrap(),
    ))
}

pub(crate) fn token_expiring_in(clock: &dyn Clock, secs: i64, role: &str) -> String {
    let claims = ClaimSet::expiring_at(clock.now() + chrono::Duration::seconds(secs))
        .with_subject("ana@example.com")
        .with_role(role);
    CredentialCodec::encode(&claims)
}

pub(crate) fn profile(role: &str) -> UserProfile {
    UserProfile {
        id: 7,
        email: "ana@example.com".to_string(),
        username: Some("ana".to_string()),
        phone_number: None,
        address: None,
        role: role.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshBehavior {
    Issue,
    /// Succeeds with a token that is already expired
    IssueExpired,
    Reject(u16),
    Fail,
}

/// Scripted auth backend that mints tokens valid for an hour.
pub(crate) struct MockAuthBackend {
    clock: Arc<dyn Clock>,
    refresh_behavior: Mutex<RefreshBehavior>,
    role: Mutex<String>,
    delay: Mutex<Duration>,
    rotate: AtomicBool,
    login_fails: AtomicBool,
    refresh_calls: AtomicUsize,
    login_calls: AtomicUsize,
    minted: AtomicUsize,
}

impl MockAuthBackend {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            refresh_behavior: Mutex::new(RefreshBehavior::Issue),
            role: Mutex::new("CUSTOMER".to_string()),
            delay: Mutex::new(Duration::ZERO),
            rotate: AtomicBool::new(false),
            login_fails: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            minted: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock() = behavior;
    }

    pub(crate) fn set_role(&self, role: &str) {
        *self.role.lock() = role.to_string();
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn set_rotation(&self, rotate: bool) {
        self.rotate.store(rotate, Ordering::SeqCst);
    }

    pub(crate) fn set_login_failure(&self, fails: bool) {
        self.login_fails.store(fails, Ordering::SeqCst);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Every minted token is distinct, even at the same paused instant.
    fn mint(&self) -> String {
        self.mint_expiring_in(3600)
    }

    fn mint_expiring_in(&self, secs: i64) -> String {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        let role = self.role.lock().clone();
        let claims = ClaimSet::expiring_at(self.clock.now() + chrono::Duration::seconds(secs))
            .with_subject("ana@example.com")
            .with_role(role)
            .with_token_id(format!("mint-{}", n));
        CredentialCodec::encode(&claims)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn login(&self, request: &LoginRequest) -> SessionResult<Credential> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;

        if self.login_fails.load(Ordering::SeqCst) {
            return Err(SessionError::InvalidCredentials("HTTP 401".to_string()));
        }

        let mut profile = profile(&self.role.lock());
        profile.email = request.email.clone();
        Ok(Credential {
            access_token: self.mint(),
            refresh_token: format!("refresh-login-{}", n),
            profile: Some(profile),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> SessionResult<RenewalGrant> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;

        let behavior = *self.refresh_behavior.lock();
        match behavior {
            RefreshBehavior::Issue => {
                let rotate = self.rotate.load(Ordering::SeqCst);
                Ok(RenewalGrant {
                    access_token: self.mint(),
                    refresh_token: rotate.then(|| format!("refresh-rotated-{}", n)),
                    profile: rotate.then(|| profile(&self.role.lock())),
                })
            }
            RefreshBehavior::IssueExpired => Ok(RenewalGrant {
                access_token: self.mint_expiring_in(-1),
                refresh_token: None,
                profile: None,
            }),
            RefreshBehavior::Reject(status) => Err(SessionError::AuthorizationRejected { status }),
            RefreshBehavior::Fail => Err(SessionError::Transport("connection refused".to_string())),
        }
    }

    async fn register(&self, request: &RegisterRequest) -> SessionResult<UserProfile> {
        Ok(UserProfile {
            id: 99,
            email: request.email.clone(),
            username: Some(request.username.clone()),
            phone_number: Some(request.phone_number.clone()),
            address: Some(request.address.clone()),
            role: "CUSTOMER".to_string(),
        })
    }
}

/// Coordinator over an in-memory store, a mock backend, and a paused clock.
pub(crate) struct Harness {
    pub store: Arc<CredentialStore>,
    pub backend: Arc<MockAuthBackend>,
    pub bus: SessionEventBus,
    pub clock: Arc<MonotonicClock>,
    pub coordinator: RefreshCoordinator,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_storage(Box::new(MemoryStorage::new()))
    }

    pub(crate) fn with_storage(storage: Box<dyn StorageBackend>) -> Self {
        let clock = test_clock();
        let store = Arc::new(CredentialStore::new(storage));
        let backend = Arc::new(MockAuthBackend::new(clock.clone()));
        let bus = SessionEventBus::new();
        let coordinator = RefreshCoordinator::with_clock(
            store.clone(),
            backend.clone(),
            bus.clone(),
            clock.clone(),
            RefreshSettings::default(),
        );

        Self {
            store,
            backend,
            bus,
            clock,
            coordinator,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn token(&self, expires_in_secs: i64, role: &str) -> String {
        token_expiring_in(self.clock.as_ref(), expires_in_secs, role)
    }

    /// Store a credential whose access token expires `expires_in_secs` from now.
    pub(crate) fn seed_credential(&self, expires_in_secs: i64, role: &str) -> Credential {
        let credential = Credential {
            access_token: self.token(expires_in_secs, role),
            refresh_token: "refresh-seed".to_string(),
            profile: Some(profile(role)),
        };
        self.store.save_credential(&credential).unwrap();
        credential
    }

    /// Collect every event published from now on.
    pub(crate) fn record_events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = self
            .bus
            .subscribe(move |event| sink.lock().push(event.clone()));
        self.subscriptions.lock().push(subscription);
        events
    }
}
