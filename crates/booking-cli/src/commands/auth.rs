//! Authentication commands.

use super::{password_or_prompt, prompt, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use session_coordinator::RegisterRequest;
use std::fmt;

#[derive(Serialize)]
struct LoginReport {
    email: String,
    role: Option<String>,
    resume_path: String,
}

impl fmt::Display for LoginReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Logged in as {}", self.email)?;
        if let Some(role) = &self.role {
            writeln!(f, "{:<10} {}", "Role:", role)?;
        }
        write!(f, "{:<10} {}", "Continue:", &self.resume_path)
    }
}

/// Login with email and password.
pub async fn login(
    context: &Context,
    email: Option<String>,
    password: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }
    let password = password_or_prompt(password)?;

    let controller = context.controller();
    let outcome = controller.login(&email, &password).await?;
    // A one-shot command does not keep the schedule running
    context.coordinator.stop();

    let report = LoginReport {
        email: outcome
            .profile
            .as_ref()
            .map(|p| p.display_name().to_string())
            .unwrap_or(email),
        role: outcome.profile.map(|p| p.role),
        resume_path: outcome.resume_path,
    };
    output::print(&report, format);
    Ok(())
}

/// Logout and clear the stored session.
pub fn logout(context: &Context, format: &OutputFormat) -> Result<()> {
    context.controller().logout()?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Account fields collected from the command line.
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub address: String,
    pub phone_number: String,
}

/// Create an account. Sign in separately afterwards.
pub async fn register(
    context: &Context,
    account: NewAccount,
    password: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let password = password_or_prompt(password)?;
    let request = RegisterRequest {
        username: account.username,
        email: account.email,
        password,
        address: account.address,
        phone_number: account.phone_number,
    };

    let profile = context.controller().register(&request).await?;
    output::print_success(
        &format!(
            "Registered {}. Run 'booking login' to sign in.",
            profile.display_name()
        ),
        format,
    );
    Ok(())
}
