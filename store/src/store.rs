//! The Store Interface: the trait boundary between the gateway's session
//! logic and whatever object store actually holds mail.

use crate::error::{AuthError, StoreError};
use crate::types::{Envelope, FolderInfo, MessageMeta, Namespace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imap_proto::command::StoreOp;
use imap_proto::flag::Flag;
use imap_proto::section::Section;
use std::sync::Arc;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify credentials and hand back an opened [`Store`] for that
    /// principal. A failure here is always `NO`, never `BAD`: a bad
    /// password is not a protocol error.
    async fn authenticate(&self, user: &str, pass: &str) -> Result<Arc<dyn Store>, AuthError>;
}

/// Which listening protocol a session was accepted on (spec.md §4.N's
/// per-protocol `imap`/`pop3` address-book feature check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Imap,
    Pop3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Imap => "imap",
            Protocol::Pop3 => "pop3",
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Address-book feature gate (spec.md §4.N): whether this account has
    /// `protocol` enabled. Most backends enable both by default.
    fn feature_enabled(&self, protocol: Protocol) -> bool {
        let _ = protocol;
        true
    }

    async fn namespace(&self) -> Namespace;

    /// `LIST`/`LSUB`: folders under `reference`, restricted to the IMAP
    /// `*`/`%` wildcard `pattern` (store backends expand the wildcard
    /// themselves rather than handing back everything and letting the
    /// gateway filter).
    async fn list_folders(&self, reference: &str, pattern: &str, subscribed_only: bool) -> Result<Vec<FolderInfo>, StoreError>;

    async fn create_folder(&self, name: &str) -> Result<(), StoreError>;
    async fn delete_folder(&self, name: &str) -> Result<(), StoreError>;
    async fn rename_folder(&self, from: &str, to: &str) -> Result<(), StoreError>;
    async fn subscribe(&self, name: &str) -> Result<(), StoreError>;
    async fn unsubscribe(&self, name: &str) -> Result<(), StoreError>;

    /// Open a folder for the session to SELECT/EXAMINE. `read_write`
    /// controls whether STORE/EXPUNGE/APPEND are permitted on the handle.
    async fn open_folder(&self, name: &str, read_write: bool) -> Result<Box<dyn Folder>, StoreError>;

    /// `STATUS`: folder counters without opening it for the session.
    async fn status(&self, name: &str) -> Result<FolderCounters, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderCounters {
    pub messages: u32,
    pub recent: u32,
    pub uid_next: u32,
    pub uid_validity: u32,
    pub unseen: u32,
}

#[async_trait]
pub trait Folder: Send + Sync {
    fn name(&self) -> &str;
    fn read_write(&self) -> bool;
    fn uid_validity(&self) -> u32;
    fn uid_next(&self) -> u32;
    fn counters(&self) -> FolderCounters;

    /// All messages currently in the folder, in sequence-number order
    /// (index 0 is sequence number 1).
    async fn messages(&self) -> Vec<MessageMeta>;

    async fn raw(&self, uid: u32) -> Result<Arc<Vec<u8>>, StoreError>;
    async fn envelope(&self, uid: u32) -> Result<Envelope, StoreError>;
    async fn section(&self, uid: u32, section: &Section) -> Result<Vec<u8>, StoreError>;

    /// `APPEND`: returns the new message's UID.
    async fn append(
        &self,
        message: Vec<u8>,
        flags: Vec<Flag>,
        internal_date: Option<DateTime<Utc>>,
    ) -> Result<u32, StoreError>;

    /// `STORE`: apply `op` with `flags` to `uid`, returning the message's
    /// resulting flag set.
    async fn store_flags(&self, uid: u32, op: StoreOp, flags: &[Flag]) -> Result<Vec<Flag>, StoreError>;

    /// `COPY`/`XAOL-MOVE`'s copy half: duplicate `uid` into `dest`,
    /// returning the new UID there for `COPYUID`/`APPENDUID`.
    async fn copy_to(&self, uid: u32, dest: &dyn Folder) -> Result<u32, StoreError>;

    /// Permanently remove every message flagged `\Deleted`. Returns the
    /// UIDs removed, in ascending order.
    async fn expunge(&self) -> Result<Vec<u32>, StoreError>;

    /// Commit and release this handle (`CLOSE`): expunges `\Deleted`
    /// messages in read-write mode, otherwise a no-op.
    async fn close(&self) -> Result<(), StoreError>;
}
