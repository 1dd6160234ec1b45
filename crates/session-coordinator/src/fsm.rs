//! Session state machines using rust-fsm.
//!
//! ## Refresh coordinator
//!
//! ```text
//!            AttemptStarted                 SessionRejected
//!   Idle ─────────────────► AwaitingAttempt ───────────────► Stopped
//!    ▲                            │                            │
//!    └────── AttemptSettled ──────┘                            │
//!    ▲                                                         │
//!    └───────────────────────── Restarted ─────────────────────┘
//! ```
//!
//! `Stopped` disables proactive scheduling after the renewal token was
//! refused. Only an explicit `start()` (after a new login) leaves it. A
//! reactive attempt made while stopped returns there via `SessionAbsent`
//! unless it renews.
//!
//! ## Privileged route access (one machine per navigation)
//!
//! ```text
//!   Checking ──NoCredential──► Denied
//!   Checking ──Fresh─────────► RoleCheck ──RoleAccepted──► Authorized
//!   Checking ──NearExpiry────► Refreshing                  RoleRejected──► Denied
//!   Refreshing ──RefreshSucceeded──► RoleCheck
//!   Refreshing ──RefreshFailed─────► Denied
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub coordinator_machine(Idle)

    Idle => {
        AttemptStarted => AwaitingAttempt
    },
    AwaitingAttempt => {
        AttemptSettled => Idle,
        SessionRejected => Stopped,
        SessionAbsent => Stopped
    },
    Stopped => {
        AttemptStarted => AwaitingAttempt,
        Restarted => Idle
    }
}

pub use coordinator_machine::Input as CoordinatorInput;
pub use coordinator_machine::State as CoordinatorMachineState;
pub use coordinator_machine::StateMachine as CoordinatorMachine;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub access_machine(Checking)

    Checking => {
        NoCredential => Denied,
        Fresh => RoleCheck,
        NearExpiry => Refreshing
    },
    Refreshing => {
        RefreshSucceeded => RoleCheck,
        RefreshFailed => Denied
    },
    RoleCheck => {
        RoleAccepted => Authorized,
        RoleRejected => Denied
    }
}

pub use access_machine::Input as AccessInput;
pub use access_machine::State as AccessMachineState;
pub use access_machine::StateMachine as AccessMachine;

/// Public view of the coordinator machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    AwaitingAttempt,
    Stopped,
}

impl From<&CoordinatorMachineState> for CoordinatorState {
    fn from(state: &CoordinatorMachineState) -> Self {
        match state {
            CoordinatorMachineState::Idle => CoordinatorState::Idle,
            CoordinatorMachineState::AwaitingAttempt => CoordinatorState::AwaitingAttempt,
            CoordinatorMachineState::Stopped => CoordinatorState::Stopped,
        }
    }
}
