//! Shared value types the Store Interface traits pass across their boundary.

use chrono::{DateTime, Utc};
use imap_proto::flag::Flag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub delimiter: char,
    pub has_children: bool,
    pub selectable: bool,
    pub subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Personal namespace prefix and hierarchy delimiter, e.g. `("", '/')`.
    pub personal: (String, char),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub mailbox: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyStructure {
    pub mime_type: String,
    pub mime_subtype: String,
    pub parameters: Vec<(String, String)>,
    pub size: u32,
    pub parts: Vec<BodyStructure>,
}

/// A message's identity and bookkeeping data, independent of its content
/// (which is fetched/sectioned separately via [`crate::mime`]).
#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub uid: u32,
    pub flags: Vec<Flag>,
    pub internal_date: DateTime<Utc>,
    pub size: u32,
}
