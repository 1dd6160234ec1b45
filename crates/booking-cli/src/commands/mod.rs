//! CLI command implementations.

mod access;
mod auth;
mod session;

pub use access::{guard, request};
pub use auth::{login, logout, register, NewAccount};
pub use session::{status, watch};

use anyhow::{Context as _, Result};
use booking_config_and_utils::{Config, Paths};
use credential_storage::create_credential_store;
use session_coordinator::{
    HttpAuthBackend, RefreshCoordinator, RefreshSettings, SessionEventBus, SessionStateController,
};
use std::io::{self, Write};
use std::sync::Arc;

/// Everything a command needs, wired from the config file and environment.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub coordinator: RefreshCoordinator,
}

impl Context {
    pub fn load() -> Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let config = Config::load(&paths).context("Failed to load config")?;

        let store = Arc::new(create_credential_store(&paths)?);
        let backend = Arc::new(HttpAuthBackend::new(
            config.api_base_url()?,
            config.request_timeout(),
        )?);
        let coordinator = RefreshCoordinator::new(
            store,
            backend,
            SessionEventBus::new(),
            RefreshSettings::from_config(&config),
        );

        Ok(Self {
            paths,
            config,
            coordinator,
        })
    }

    pub fn controller(&self) -> SessionStateController {
        SessionStateController::new(self.coordinator.clone())
            .with_admin_role(self.config.admin_role.clone())
    }
}

/// Read one trimmed line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

/// Use the given password, or ask for one without echo.
fn password_or_prompt(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
