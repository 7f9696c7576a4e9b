//! Gateway-level error kinds (spec.md §7) and their mapping to protocol text.
//!
//! Every fallible session operation returns `Result<T, GatewayError>`. The
//! dispatcher ([`crate::session`]) is the only place that turns one of
//! these into a tagged `NO`/`BAD` response; no other layer formats
//! protocol text from an error, matching spec.md §7's propagation policy.

use imap_proto::response::Code;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("wrong username or password")]
    LogonFailed,
    #[error("access denied: {0}")]
    NoAccess(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Collision(String),
    #[error("not supported: {0}")]
    NoSupport(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timeout")]
    Timeout,
    #[error("malformed request: {0}")]
    CallFailed(String),
    #[error("server not configured: {0}")]
    Unconfigured(String),
    /// `LOGOUT`, or a forced disconnect (error-counter threshold, oversized
    /// literal abort) — not itself a client-visible error.
    #[error("end of session")]
    EndOfSession,
    /// spec.md §4.N's address-book feature gate: the account has `imap` or
    /// `pop3` disabled. Carries the protocol name; always ends the session.
    #[error("feature disabled: {0}")]
    FeatureDisabled(&'static str),
    #[error("not enough memory")]
    NotEnoughMemory,
}

/// One line of tagged-response text plus an optional `[CODE]`. The
/// dispatcher is the only caller.
pub struct Rendered {
    pub code: Option<Code>,
    pub text: String,
}

impl GatewayError {
    /// Whether this error counts toward spec.md §4.K's per-session
    /// failure counter (every `NO`/`BAD` does; `EndOfSession` does not,
    /// since the session is already ending).
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, GatewayError::EndOfSession | GatewayError::FeatureDisabled(_))
    }

    pub fn render(&self) -> Rendered {
        match self {
            GatewayError::LogonFailed => {
                Rendered { code: None, text: "LOGIN wrong username or password".into() }
            }
            GatewayError::NoAccess(msg) if msg == "plaintext" => Rendered {
                code: None,
                text: "[PRIVACYREQUIRED] Plaintext authentication disallowed on non-secure (SSL/TLS) connections.".into(),
            },
            // Every other `NoAccess` already carries its full user-facing
            // text (feature-gate denials, read-only mailboxes, protected
            // mailbox names) rather than a bare feature name.
            GatewayError::NoAccess(msg) => Rendered { code: None, text: msg.clone() },
            GatewayError::NotFound(what) if what == "trycreate" => {
                Rendered { code: Some(Code::TryCreate), text: "mailbox does not exist".into() }
            }
            GatewayError::NotFound(what) => Rendered { code: None, text: format!("{what} not found") },
            GatewayError::Collision(what) => Rendered { code: None, text: format!("{what} already exists") },
            GatewayError::NoSupport(what) => Rendered { code: None, text: format!("{what} method not supported") },
            GatewayError::CallFailed(msg) => Rendered { code: None, text: msg.clone() },
            GatewayError::Unconfigured(msg) => Rendered { code: None, text: msg.clone() },
            GatewayError::NetworkError(_) | GatewayError::Timeout | GatewayError::EndOfSession => {
                Rendered { code: None, text: String::new() }
            }
            GatewayError::FeatureDisabled(protocol) => {
                Rendered { code: None, text: format!("LOGIN {protocol} feature disabled") }
            }
            GatewayError::NotEnoughMemory => Rendered { code: None, text: "server out of memory".into() },
        }
    }
}

impl From<store::StoreError> for GatewayError {
    fn from(e: store::StoreError) -> Self {
        match e {
            store::StoreError::NoSuchMailbox(name) => GatewayError::NotFound(name),
            store::StoreError::MailboxExists(name) => GatewayError::Collision(name),
            store::StoreError::NoMailboxSelected => GatewayError::CallFailed("no mailbox selected".into()),
            store::StoreError::ReadOnly => GatewayError::NoAccess("mailbox is read-only".into()),
            store::StoreError::NoSuchMessage(uid) => GatewayError::NotFound(format!("message {uid}")),
            store::StoreError::Mime(msg) => GatewayError::CallFailed(msg),
            store::StoreError::Backend(msg) => GatewayError::NetworkError(msg),
        }
    }
}

impl From<store::AuthError> for GatewayError {
    fn from(_: store::AuthError) -> Self {
        GatewayError::LogonFailed
    }
}
