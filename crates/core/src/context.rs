//! Caller context threaded through every public operation
//!
//! The context carries the cancellation probe, the authentication
//! provider, and configuration. Nothing in the core reads process
//! globals or environment variables; everything flows through here.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cancellation probe supplied by the caller
///
/// Long operations consult the probe at well-defined granularities
/// (per directory entry, per file). A probe returning true unwinds the
/// operation with [`Error::Canceled`]; scoped guards release locks and
/// handles on the way out.
pub trait CancelProbe: Send + Sync {
    /// True if the caller wants the current operation abandoned
    fn is_canceled(&self) -> bool;
}

impl<F> CancelProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_canceled(&self) -> bool {
        self()
    }
}

/// Authentication provider
///
/// Transport-level authentication is out of scope; the core only ever
/// asks for the identity to record as the committing author.
pub trait AuthProvider: Send + Sync {
    /// Username to record for commits, if any
    fn username(&self) -> Option<String>;
}

/// Configuration carried by the context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Glob patterns for unversioned items the status walk skips
    /// unless `no_ignore` is set
    pub global_ignores: Vec<String>,
}

static DEFAULT_IGNORES: Lazy<Vec<String>> = Lazy::new(|| {
    ["*.o", "*.lo", "*.la", "*~", ".#*", "#*#"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

impl Default for Config {
    fn default() -> Self {
        Config {
            global_ignores: DEFAULT_IGNORES.clone(),
        }
    }
}

/// Caller context: cancellation, auth, configuration
#[derive(Clone, Default)]
pub struct Context {
    cancel: Option<Arc<dyn CancelProbe>>,
    auth: Option<Arc<dyn AuthProvider>>,
    /// Configuration for this operation
    pub config: Config,
}

impl Context {
    /// Context with default configuration and no probes
    pub fn new() -> Self {
        Context::default()
    }

    /// Attach a cancellation probe
    pub fn with_cancel(mut self, probe: Arc<dyn CancelProbe>) -> Self {
        self.cancel = Some(probe);
        self
    }

    /// Attach an authentication provider
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Consult the cancellation probe
    ///
    /// # Errors
    /// Returns [`Error::Canceled`] if the probe requests an unwind.
    pub fn check_canceled(&self) -> Result<()> {
        match &self.cancel {
            Some(probe) if probe.is_canceled() => Err(Error::Canceled),
            _ => Ok(()),
        }
    }

    /// Username to record for commits, if an auth provider is attached
    pub fn username(&self) -> Option<String> {
        self.auth.as_ref().and_then(|a| a.username())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancel", &self.cancel.is_some())
            .field("auth", &self.auth.is_some())
            .field("config", &self.config)
            .finish()
    }
}
