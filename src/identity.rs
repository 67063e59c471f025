//! Identity provider interface and credential loading.
//!
//! The verification service treats identity as an external collaborator: it
//! only needs a signed-in identity (unique id plus optional profile fields)
//! and a token-like session handle. Change notifications flow through a
//! `watch` channel so consumers can react to sign-in/sign-out.

use std::env;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name for stored session tokens.
const KEYRING_SERVICE: &str = "truelens";

/// A signed-in user identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UserIdentity {
    /// Unique user id.
    pub uid: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Optional email address.
    pub email: Option<String>,
    /// Optional avatar URL.
    pub photo_url: Option<String>,
}

impl UserIdentity {
    /// Name to show in the UI: display name, the email local part, or
    /// `"User"`.
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        if let Some(email) = self.email.as_deref() {
            if let Some(local) = email.split('@').next().filter(|l| !l.is_empty()) {
                return local.to_owned();
            }
        }
        "User".into()
    }

    /// Up to two initials for an avatar fallback, or `"?"`.
    #[must_use]
    pub fn initials(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            let initials: String = name
                .split_whitespace()
                .filter_map(|word| word.chars().next())
                .take(2)
                .flat_map(char::to_uppercase)
                .collect();
            if !initials.is_empty() {
                return initials;
            }
        }
        if let Some(first) = self.email.as_deref().and_then(|e| e.chars().next()) {
            return first.to_uppercase().to_string();
        }
        "?".into()
    }
}

/// Source of the current identity and its change notifications.
pub trait IdentityProvider: Send + Sync {
    /// Currently signed-in identity, if any.
    fn current(&self) -> Option<UserIdentity>;

    /// Watch receiver that yields on sign-in/sign-out.
    fn changes(&self) -> watch::Receiver<Option<UserIdentity>>;
}

/// Identity provider backed by a locally stored session token.
///
/// The session token is looked up keychain-first with an environment
/// variable fallback; the identity itself is static for the process
/// lifetime (the surrounding UI owns the interactive sign-in flow).
pub struct StoredIdentity {
    identity_tx: watch::Sender<Option<UserIdentity>>,
    token: String,
}

impl StoredIdentity {
    /// Build a provider for a known identity, loading its session token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if no token is found in the keychain or
    /// the `TRUELENS_SESSION_TOKEN` environment variable.
    pub async fn load(identity: UserIdentity) -> Result<Self> {
        let token = load_credential("session_token", "TRUELENS_SESSION_TOKEN").await?;
        let (identity_tx, _) = watch::channel(Some(identity));
        Ok(Self { identity_tx, token })
    }

    /// Provider with an explicit token, bypassing credential lookup (tests,
    /// anonymous sessions).
    #[must_use]
    pub fn with_token(identity: UserIdentity, token: String) -> Self {
        let (identity_tx, _) = watch::channel(Some(identity));
        Self { identity_tx, token }
    }

    /// The token-like session handle sent alongside requests.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Mark the user as signed out, notifying subscribers.
    pub fn sign_out(&self) {
        let _ = self.identity_tx.send(None);
    }
}

impl IdentityProvider for StoredIdentity {
    fn current(&self) -> Option<UserIdentity> {
        self.identity_tx.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.identity_tx.subscribe()
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Keyring is synchronous I/O; keep it off the async workers.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Identity(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Identity(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
