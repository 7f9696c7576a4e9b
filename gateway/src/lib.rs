//! Multi-protocol IMAP4rev1/POP3 session gateway.
//!
//! Components F–N of spec.md, laid out one module per component: mailbox
//! view ([`mailbox_view`]), search compiler ([`search`]), fetch engine
//! ([`fetch`]), mutating commands ([`mutate`]), IDLE notifier ([`idle`]),
//! command dispatcher & state machine ([`session`]), listener/session
//! supervisor ([`listener`]), POP3 session ([`pop3`]), and auth policy
//! ([`auth`]). [`config`] and [`error`] are the ambient configuration and
//! error-kind layers both protocols share.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod idle;
pub mod listener;
pub mod mailbox_view;
pub mod mutate;
pub mod pop3;
pub mod search;
pub mod session;
