//! Session status and the foreground refresh loop.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use session_coordinator::{Clock, CredentialCodec, Freshness, SessionSnapshot, SystemClock};
use std::fmt;
use tracing::info;

#[derive(Serialize)]
struct StatusReport {
    logged_in: bool,
    user: Option<String>,
    role: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    /// `fresh`, `renewable`, or `expired`
    token: Option<&'static str>,
    api_base_url: String,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {}", "API:", &self.api_base_url)?;
        if !self.logged_in {
            return write!(f, "{:<10} {}", "Auth:", "not logged in");
        }

        writeln!(f, "{:<10} {}", "Auth:", "logged in")?;
        writeln!(f, "{:<10} {}", "User:", self.user.as_deref().unwrap_or("unknown"))?;
        writeln!(f, "{:<10} {}", "Role:", self.role.as_deref().unwrap_or("unknown"))?;
        let expires = self
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unreadable".to_string());
        writeln!(f, "{:<10} {}", "Expires:", &expires)?;
        write!(f, "{:<10} {}", "Token:", self.token.unwrap_or("unknown"))
    }
}

/// Show the stored session without contacting the API.
pub fn status(context: &Context, format: &OutputFormat) -> Result<()> {
    let credential = context.coordinator.store().credential()?;
    let api_base_url = context.config.api_base_url.clone();

    let report = match credential {
        None => StatusReport {
            logged_in: false,
            user: None,
            role: None,
            expires_at: None,
            token: None,
            api_base_url,
        },
        Some(credential) => {
            let decoded = CredentialCodec::decode(&credential.access_token);
            let freshness =
                decoded.assess(SystemClock.now(), context.coordinator.settings().refresh_threshold);
            StatusReport {
                logged_in: true,
                user: credential.profile.as_ref().map(|p| p.display_name().to_string()),
                role: decoded
                    .role()
                    .map(str::to_string)
                    .or_else(|| credential.profile.as_ref().map(|p| p.role.clone())),
                expires_at: decoded.expires_at(),
                token: Some(match freshness {
                    Freshness::Fresh => "fresh",
                    Freshness::Renewable { .. } => "renewable",
                    Freshness::Expired => "expired",
                }),
                api_base_url,
            }
        }
    };

    output::print(&report, format);
    Ok(())
}

#[derive(Serialize)]
struct SnapshotLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

impl fmt::Display for SnapshotLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self
            .snapshot
            .profile
            .as_ref()
            .map(|p| p.display_name())
            .unwrap_or("-");
        let state = if self.snapshot.is_authenticated {
            "signed in"
        } else {
            "signed out"
        };
        write!(f, "[{}] {} ({})", self.at.format("%H:%M:%S"), state, who)
    }
}

/// Keep the session fresh until Ctrl-C, printing each change.
pub async fn watch(context: &Context, format: &OutputFormat) -> Result<()> {
    let controller = context.controller();
    let mut changes = controller.subscribe();
    let snapshot = controller.activate()?;

    print_snapshot(&snapshot, format);
    if !snapshot.is_authenticated {
        output::print_error("Not logged in. Run 'booking login' first.", format);
        return Ok(());
    }
    changes.mark_unchanged();
    info!("Watching session");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                print_snapshot(&snapshot, format);
                if !snapshot.is_authenticated {
                    output::print_error("Session ended. Run 'booking login' to sign in again.", format);
                    break;
                }
            }
        }
    }

    context.coordinator.stop();
    controller.deactivate();
    info!("Stopped watching session");
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot, format: &OutputFormat) {
    output::print(
        &SnapshotLine {
            at: Utc::now(),
            snapshot,
        },
        format,
    );
}
