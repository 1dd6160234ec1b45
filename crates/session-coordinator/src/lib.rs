//! Session and token lifecycle for the booking client.
//!
//! The pieces, bottom-up:
//!
//! - [`CredentialCodec`] reads expiry and role claims from an access token.
//! - [`RefreshCoordinator`] renews tokens on a schedule and on demand, with at
//!   most one renewal in flight.
//! - [`SessionEventBus`] tells every surface about renewals and sign-outs.
//! - [`SessionStateController`] keeps one surface's view of the session.
//! - [`PrivilegedRouteGuard`] refreshes before checking a route's role.
//! - [`RequestGateway`] attaches the token and retries once on 401.
//!
//! Everything shares one [`credential_storage::CredentialStore`].

mod backend;
mod clock;
mod codec;
mod error;
mod events;
mod fsm;
mod gateway;
mod guard;
mod refresh;
mod state;

#[cfg(test)]
mod test_support;

pub use backend::{
    ApiResponse, AuthBackend, HttpAuthBackend, LoginRequest, RegisterRequest, RenewalGrant,
};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use codec::{ClaimSet, CredentialCodec, Decoded, Freshness};
pub use error::{SessionError, SessionResult};
pub use events::{ClearReason, SessionEvent, SessionEventBus, Subscription};
pub use fsm::CoordinatorState;
pub use gateway::{
    ApiRequest, HttpTransport, InboundResponse, OutboundRequest, ReqwestTransport, RequestGateway,
};
pub use guard::{AccessDecision, AccessPolicy, Denial, DenialReason, PrivilegedRouteGuard};
pub use refresh::{CoordinatorStatus, RefreshCoordinator, RefreshOutcome, RefreshSettings};
pub use state::{LoginOutcome, SessionSnapshot, SessionStateController};

pub use reqwest::Method;
