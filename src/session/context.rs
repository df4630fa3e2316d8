//! Process-wide session context
//!
//! Created once at startup and handed to whatever needs configuration or
//! credentials. `logout` is the teardown half of its lifecycle.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::config::Config;

pub struct SessionContext {
    config: Config,
    token: RwLock<Option<String>>,
}

impl SessionContext {
    /// Build the context, reading the auth token from the configured variable
    pub fn init(config: Config) -> Arc<Self> {
        let token = std::env::var(&config.auth.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if token.is_some() {
            info!("Session initialised with token from {}", config.auth.token_env);
        } else {
            debug!("No auth token in {}, requests go out anonymous", config.auth.token_env);
        }

        Arc::new(Self {
            config,
            token: RwLock::new(token),
        })
    }

    /// Context with an explicit token, bypassing the environment
    pub fn with_token(config: Config, token: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            config,
            token: RwLock::new(token),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth_token(&self) -> Option<String> {
        self.read_token().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.write_token() = Some(token.into());
        info!("Auth token updated");
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_token().is_some()
    }

    /// Drop the credentials held by this session
    pub fn logout(&self) {
        if self.write_token().take().is_some() {
            info!("Logged out, auth token cleared");
        }
    }

    fn read_token(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.token.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_token(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
