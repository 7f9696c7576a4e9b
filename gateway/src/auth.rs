//! Component N: auth policy (spec.md §4.N).
//!
//! Wraps a [`store::Authenticator`] with the gateway's own policy layer:
//! the plaintext-over-cleartext ban, the shared LOGIN/AUTHENTICATE retry
//! counter, and the audit log line. Credential checking itself is entirely
//! delegated to the store.

use std::sync::Arc;
use store::{Authenticator, Protocol, Store};

use crate::error::GatewayError;

/// spec.md §4.N's `LOGIN_RETRIES`.
pub const LOGIN_RETRIES: u32 = 5;

pub struct AuthPolicy {
    authenticator: Arc<dyn Authenticator>,
    disable_plaintext_auth: bool,
}

impl AuthPolicy {
    pub fn new(authenticator: Arc<dyn Authenticator>, disable_plaintext_auth: bool) -> Self {
        AuthPolicy { authenticator, disable_plaintext_auth }
    }

    /// `failed_logins` is the caller's per-session counter; this returns an
    /// error that also tells the caller whether the session must now be
    /// forcibly ended (spec.md: "when it reaches `LOGIN_RETRIES`, the
    /// session is forcibly ended").
    pub async fn login(
        &self,
        user: &str,
        pass: &str,
        peer: &str,
        protocol: Protocol,
        is_encrypted: bool,
        is_local: bool,
        failed_logins: &mut u32,
    ) -> Result<Arc<dyn Store>, GatewayError> {
        if self.disable_plaintext_auth && !is_encrypted && !is_local {
            return Err(GatewayError::NoAccess("plaintext".into()));
        }
        match self.authenticator.authenticate(user, pass).await {
            Ok(store) => {
                if !store.feature_enabled(protocol) {
                    tracing::warn!(user, from = peer, protocol = protocol.as_str(), "feature disabled");
                    return Err(GatewayError::FeatureDisabled(protocol.as_str()));
                }
                *failed_logins = 0;
                tracing::info!(user, from = peer, method = "LOGIN", program = "gatewayd", "authenticate ok");
                Ok(store)
            }
            Err(_) => {
                *failed_logins += 1;
                tracing::warn!(user, from = peer, attempts = *failed_logins, "authenticate failed");
                Err(GatewayError::LogonFailed)
            }
        }
    }
}
