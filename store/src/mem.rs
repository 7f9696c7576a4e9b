//! In-memory reference implementation of the Store Interface.
//!
//! Exists for tests and local development, not as a production backend —
//! there is no persistence and no concurrency control beyond a single
//! `Mutex` per mailbox.

use crate::error::{AuthError, StoreError};
use crate::store::{Folder, FolderCounters, Protocol, Store};
use crate::types::{Envelope, FolderInfo, MessageMeta, Namespace};
use crate::{mime, Authenticator};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imap_proto::command::StoreOp;
use imap_proto::flag::Flag;
use imap_proto::section::Section;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct StoredMessage {
    uid: u32,
    flags: Vec<Flag>,
    internal_date: DateTime<Utc>,
    raw: Arc<Vec<u8>>,
}

struct MailboxState {
    messages: Vec<StoredMessage>,
    uid_validity: u32,
    uid_next: u32,
    subscribed: bool,
}

impl MailboxState {
    fn new(uid_validity: u32) -> Self {
        MailboxState { messages: Vec::new(), uid_validity, uid_next: 1, subscribed: false }
    }
}

struct Mailboxes {
    mailboxes: Mutex<HashMap<String, MailboxState>>,
    next_uid_validity: Mutex<u32>,
}

impl Mailboxes {
    fn fresh_uid_validity(&self) -> u32 {
        let mut next = self.next_uid_validity.lock().unwrap();
        let v = *next;
        *next += 1;
        v
    }
}

/// An account's mailbox tree. Cheap to clone: it's a handle around a
/// shared, mutex-protected map, so [`Folder`] handles opened from it stay
/// valid independent of `MemStore`'s own lifetime.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<Mailboxes>,
    imap_enabled: bool,
    pop3_enabled: bool,
}

impl MemStore {
    pub fn new() -> Self {
        let mut mailboxes = HashMap::new();
        mailboxes.insert("INBOX".to_string(), MailboxState::new(1));
        MemStore {
            inner: Arc::new(Mailboxes { mailboxes: Mutex::new(mailboxes), next_uid_validity: Mutex::new(2) }),
            imap_enabled: true,
            pop3_enabled: true,
        }
    }

    /// Address-book feature flags for this account (spec.md §4.N).
    pub fn with_features(mut self, imap_enabled: bool, pop3_enabled: bool) -> Self {
        self.imap_enabled = imap_enabled;
        self.pop3_enabled = pop3_enabled;
        self
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemStore {
    fn feature_enabled(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Imap => self.imap_enabled,
            Protocol::Pop3 => self.pop3_enabled,
        }
    }

    async fn namespace(&self) -> Namespace {
        Namespace { personal: (String::new(), '/') }
    }

    async fn list_folders(&self, _reference: &str, pattern: &str, subscribed_only: bool) -> Result<Vec<FolderInfo>, StoreError> {
        let mailboxes = self.inner.mailboxes.lock().unwrap();
        let mut out: Vec<FolderInfo> = mailboxes
            .iter()
            .filter(|(_, state)| !subscribed_only || state.subscribed)
            .filter(|(name, _)| wildcard_match(pattern, name))
            .map(|(name, state)| FolderInfo {
                name: name.clone(),
                delimiter: '/',
                has_children: mailboxes.keys().any(|other| other.starts_with(&format!("{name}/"))),
                selectable: true,
                subscribed: state.subscribed,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_folder(&self, name: &str) -> Result<(), StoreError> {
        let validity = self.inner.fresh_uid_validity();
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        if mailboxes.contains_key(name) {
            return Err(StoreError::MailboxExists(name.to_string()));
        }
        mailboxes.insert(name.to_string(), MailboxState::new(validity));
        Ok(())
    }

    async fn delete_folder(&self, name: &str) -> Result<(), StoreError> {
        if name.eq_ignore_ascii_case("inbox") {
            return Err(StoreError::Backend("INBOX cannot be deleted".into()));
        }
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        mailboxes.remove(name).map(|_| ()).ok_or_else(|| StoreError::NoSuchMailbox(name.to_string()))
    }

    async fn rename_folder(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        let state = mailboxes.remove(from).ok_or_else(|| StoreError::NoSuchMailbox(from.to_string()))?;
        mailboxes.insert(to.to_string(), state);
        Ok(())
    }

    async fn subscribe(&self, name: &str) -> Result<(), StoreError> {
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        let state = mailboxes.get_mut(name).ok_or_else(|| StoreError::NoSuchMailbox(name.to_string()))?;
        state.subscribed = true;
        Ok(())
    }

    async fn unsubscribe(&self, name: &str) -> Result<(), StoreError> {
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        let state = mailboxes.get_mut(name).ok_or_else(|| StoreError::NoSuchMailbox(name.to_string()))?;
        state.subscribed = false;
        Ok(())
    }

    async fn open_folder(&self, name: &str, read_write: bool) -> Result<Box<dyn Folder>, StoreError> {
        let mailboxes = self.inner.mailboxes.lock().unwrap();
        if !mailboxes.contains_key(name) {
            return Err(StoreError::NoSuchMailbox(name.to_string()));
        }
        drop(mailboxes);
        Ok(Box::new(MemFolder { store: self.inner.clone(), name: name.to_string(), read_write }))
    }

    async fn status(&self, name: &str) -> Result<FolderCounters, StoreError> {
        let mailboxes = self.inner.mailboxes.lock().unwrap();
        let state = mailboxes.get(name).ok_or_else(|| StoreError::NoSuchMailbox(name.to_string()))?;
        Ok(counters_of(state))
    }
}

fn counters_of(state: &MailboxState) -> FolderCounters {
    FolderCounters {
        messages: state.messages.len() as u32,
        // `\Recent` has no store-wide meaning (spec.md §3: it's scoped to
        // the session that observes it); `STATUS`'s RECENT item is only
        // ever asked of a mailbox nobody has selected yet in this gateway,
        // so every message still counts.
        recent: state.messages.len() as u32,
        uid_next: state.uid_next,
        uid_validity: state.uid_validity,
        unseen: state.messages.iter().filter(|m| !m.flags.contains(&Flag::Seen)).count() as u32,
    }
}

struct MemFolder {
    store: Arc<Mailboxes>,
    name: String,
    read_write: bool,
}

#[async_trait]
impl Folder for MemFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_write(&self) -> bool {
        self.read_write
    }

    fn uid_validity(&self) -> u32 {
        self.store.mailboxes.lock().unwrap().get(&self.name).map(|s| s.uid_validity).unwrap_or(0)
    }

    fn uid_next(&self) -> u32 {
        self.store.mailboxes.lock().unwrap().get(&self.name).map(|s| s.uid_next).unwrap_or(1)
    }

    fn counters(&self) -> FolderCounters {
        let mailboxes = self.store.mailboxes.lock().unwrap();
        mailboxes.get(&self.name).map(counters_of).unwrap_or_default()
    }

    async fn messages(&self) -> Vec<MessageMeta> {
        let mailboxes = self.store.mailboxes.lock().unwrap();
        mailboxes
            .get(&self.name)
            .map(|s| {
                s.messages
                    .iter()
                    .map(|m| MessageMeta {
                        uid: m.uid,
                        flags: m.flags.clone(),
                        internal_date: m.internal_date,
                        size: m.raw.len() as u32,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn raw(&self, uid: u32) -> Result<Arc<Vec<u8>>, StoreError> {
        let mailboxes = self.store.mailboxes.lock().unwrap();
        let state = mailboxes.get(&self.name).ok_or_else(|| StoreError::NoSuchMailbox(self.name.clone()))?;
        state
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .map(|m| m.raw.clone())
            .ok_or(StoreError::NoSuchMessage(uid))
    }

    async fn envelope(&self, uid: u32) -> Result<Envelope, StoreError> {
        let raw = self.raw(uid).await?;
        let mail = mime::parse(&raw)?;
        Ok(mime::envelope(&mail))
    }

    async fn section(&self, uid: u32, section: &Section) -> Result<Vec<u8>, StoreError> {
        let raw = self.raw(uid).await?;
        let mail = mime::parse(&raw)?;
        mime::section_bytes(&mail, &raw, section)
    }

    async fn append(&self, message: Vec<u8>, flags: Vec<Flag>, internal_date: Option<DateTime<Utc>>) -> Result<u32, StoreError> {
        let mut mailboxes = self.store.mailboxes.lock().unwrap();
        let state = mailboxes.get_mut(&self.name).ok_or_else(|| StoreError::NoSuchMailbox(self.name.clone()))?;
        let uid = state.uid_next;
        state.uid_next += 1;
        // `\Recent` is session-local (spec.md §3) and is computed entirely
        // by `gateway::mailbox_view::MailboxView` against the UIDs each
        // session has already observed; it never belongs in a message's
        // stored flag set, or it would never expire.
        state.messages.push(StoredMessage {
            uid,
            flags,
            internal_date: internal_date.unwrap_or_else(Utc::now),
            raw: Arc::new(message),
        });
        Ok(uid)
    }

    async fn store_flags(&self, uid: u32, op: StoreOp, flags: &[Flag]) -> Result<Vec<Flag>, StoreError> {
        let mut mailboxes = self.store.mailboxes.lock().unwrap();
        let state = mailboxes.get_mut(&self.name).ok_or_else(|| StoreError::NoSuchMailbox(self.name.clone()))?;
        let msg = state.messages.iter_mut().find(|m| m.uid == uid).ok_or(StoreError::NoSuchMessage(uid))?;
        match op {
            StoreOp::Replace => msg.flags = flags.to_vec(),
            StoreOp::Add => {
                for f in flags {
                    if !msg.flags.contains(f) {
                        msg.flags.push(f.clone());
                    }
                }
            }
            StoreOp::Remove => msg.flags.retain(|f| !flags.contains(f)),
        }
        Ok(msg.flags.clone())
    }

    async fn copy_to(&self, uid: u32, dest: &dyn Folder) -> Result<u32, StoreError> {
        let raw = self.raw(uid).await?;
        let flags = {
            let mailboxes = self.store.mailboxes.lock().unwrap();
            let state = mailboxes.get(&self.name).ok_or_else(|| StoreError::NoSuchMailbox(self.name.clone()))?;
            state.messages.iter().find(|m| m.uid == uid).map(|m| m.flags.clone()).ok_or(StoreError::NoSuchMessage(uid))?
        };
        let date = {
            let mailboxes = self.store.mailboxes.lock().unwrap();
            mailboxes
                .get(&self.name)
                .and_then(|s| s.messages.iter().find(|m| m.uid == uid))
                .map(|m| m.internal_date)
        };
        dest.append((*raw).clone(), flags, date).await
    }

    async fn expunge(&self) -> Result<Vec<u32>, StoreError> {
        if !self.read_write {
            return Err(StoreError::ReadOnly);
        }
        let mut mailboxes = self.store.mailboxes.lock().unwrap();
        let state = mailboxes.get_mut(&self.name).ok_or_else(|| StoreError::NoSuchMailbox(self.name.clone()))?;
        let mut removed = Vec::new();
        state.messages.retain(|m| {
            if m.flags.contains(&Flag::Deleted) {
                removed.push(m.uid);
                false
            } else {
                true
            }
        });
        removed.sort_unstable();
        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.read_write {
            self.expunge().await?;
        }
        Ok(())
    }
}

/// `*`/`%` mailbox-name wildcard matching (`*` crosses hierarchy
/// delimiters, `%` doesn't — but this reference store keeps names flat
/// enough that the distinction rarely bites).
fn wildcard_match(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == "%" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix('%') {
        return name.starts_with(prefix) && !name[prefix.len()..].contains('/');
    }
    pattern == name
}

/// Fixed-credential authenticator wrapping one [`MemStore`] per account,
/// for tests and local development.
pub struct MemAuthenticator {
    accounts: HashMap<String, (String, Arc<MemStore>)>,
}

impl MemAuthenticator {
    pub fn new() -> Self {
        MemAuthenticator { accounts: HashMap::new() }
    }

    pub fn with_account(mut self, user: &str, pass: &str) -> Self {
        self.accounts.insert(user.to_string(), (pass.to_string(), Arc::new(MemStore::new())));
        self
    }

    /// Like [`Self::with_account`], with the address-book `imap`/`pop3`
    /// feature flags explicitly set (spec.md §4.N).
    pub fn with_account_features(mut self, user: &str, pass: &str, imap_enabled: bool, pop3_enabled: bool) -> Self {
        let store = MemStore::new().with_features(imap_enabled, pop3_enabled);
        self.accounts.insert(user.to_string(), (pass.to_string(), Arc::new(store)));
        self
    }
}

impl Default for MemAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for MemAuthenticator {
    async fn authenticate(&self, user: &str, pass: &str) -> Result<Arc<dyn Store>, AuthError> {
        match self.accounts.get(user) {
            Some((expected, store)) if expected == pass => Ok(store.clone() as Arc<dyn Store>),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        assert!(auth.authenticate("alice", "wrong").await.is_err());
        assert!(auth.authenticate("alice", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn append_then_fetch_round_trips_the_message() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        let store = auth.authenticate("alice", "secret").await.unwrap();
        let folder = store.open_folder("INBOX", true).await.unwrap();
        let uid = folder
            .append(b"Subject: hi\r\n\r\nbody\r\n".to_vec(), vec![Flag::Seen], None)
            .await
            .unwrap();
        let raw = folder.raw(uid).await.unwrap();
        assert!(raw.starts_with(b"Subject: hi"));
        assert_eq!(folder.counters().messages, 1);
    }

    #[tokio::test]
    async fn store_flags_add_remove_replace() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        let store = auth.authenticate("alice", "secret").await.unwrap();
        let folder = store.open_folder("INBOX", true).await.unwrap();
        let uid = folder.append(b"x".to_vec(), vec![], None).await.unwrap();

        let flags = folder.store_flags(uid, StoreOp::Add, &[Flag::Flagged]).await.unwrap();
        assert!(flags.contains(&Flag::Flagged));

        let flags = folder.store_flags(uid, StoreOp::Remove, &[Flag::Flagged]).await.unwrap();
        assert!(!flags.contains(&Flag::Flagged));

        let flags = folder.store_flags(uid, StoreOp::Replace, &[Flag::Seen, Flag::Answered]).await.unwrap();
        assert_eq!(flags.len(), 2);
    }

    #[tokio::test]
    async fn expunge_removes_only_deleted_messages() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        let store = auth.authenticate("alice", "secret").await.unwrap();
        let folder = store.open_folder("INBOX", true).await.unwrap();
        let keep = folder.append(b"keep".to_vec(), vec![], None).await.unwrap();
        let drop_uid = folder.append(b"drop".to_vec(), vec![Flag::Deleted], None).await.unwrap();

        let removed = folder.expunge().await.unwrap();
        assert_eq!(removed, vec![drop_uid]);
        assert!(folder.raw(keep).await.is_ok());
        assert!(folder.raw(drop_uid).await.is_err());
    }

    #[tokio::test]
    async fn list_folders_respects_wildcard_and_subscription_filter() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        let store = auth.authenticate("alice", "secret").await.unwrap();
        store.create_folder("Archive").await.unwrap();
        store.subscribe("Archive").await.unwrap();

        let all = store.list_folders("", "*", false).await.unwrap();
        assert_eq!(all.len(), 2);

        let subscribed = store.list_folders("", "*", true).await.unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].name, "Archive");
    }

    #[tokio::test]
    async fn feature_flags_default_enabled_and_are_respected_when_set() {
        let auth = MemAuthenticator::new().with_account("alice", "secret");
        let store = auth.authenticate("alice", "secret").await.unwrap();
        assert!(store.feature_enabled(Protocol::Imap));
        assert!(store.feature_enabled(Protocol::Pop3));

        let auth = MemAuthenticator::new().with_account_features("carol", "locked", false, true);
        let store = auth.authenticate("carol", "locked").await.unwrap();
        assert!(!store.feature_enabled(Protocol::Imap));
        assert!(store.feature_enabled(Protocol::Pop3));
    }
}
