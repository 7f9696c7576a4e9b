//! Component F: the selected-folder snapshot (spec.md §4.F / §3).
//!
//! `MailboxView` owns the session's ordered `(seqnum -> {uid, flags,
//! recent})` cache for whichever folder is currently SELECTed/EXAMINEd, and
//! the `Refresh` algorithm that reconciles it against the store on SELECT,
//! NOOP, CHECK and after any mutating command.
//!
//! The Store Interface this gateway targets (`store::Folder`) already
//! resolves a message's flags into [`Flag`] values rather than handing back
//! raw MAPI properties (`msgFlags`/`flagStatus`/`msgStatus`/`lastVerb`), so
//! spec.md §4.F's `PropsToFlags` derivation has no work left to do here
//! beyond adding the session-local `\Recent` bit — recorded as an Open
//! Question decision in `DESIGN.md`.

use imap_proto::flag::{flags_to_wire, Flag};
use std::collections::HashMap;
use store::Folder;

#[derive(Debug, Clone)]
pub struct MailEntry {
    pub uid: u32,
    pub flags: Vec<Flag>,
    pub recent: bool,
}

impl MailEntry {
    /// This entry's flags with the session-local `\Recent` bit folded in —
    /// the only place `\Recent` should ever come from on the wire (spec.md
    /// §3's session-local definition).
    pub fn flags_with_recent(&self) -> Vec<Flag> {
        with_recent(&self.flags, self.recent)
    }

    /// Some other, possibly fresher, raw flag set for this message (e.g.
    /// `STORE`'s immediate result) with this entry's `\Recent` bit folded
    /// in, since `STORE` never changes recency.
    pub fn merge_recent(&self, raw_flags: &[Flag]) -> Vec<Flag> {
        with_recent(raw_flags, self.recent)
    }
}

/// Owned by the session while a folder is selected (spec.md §3).
pub struct MailboxView {
    pub name: String,
    pub read_only: bool,
    pub uid_validity: u32,
    /// Highest UID this session has observed in this folder; used to
    /// recompute `\Recent` after reselection and to resolve sequence-set
    /// `*` in UID mode.
    pub last_uid: u32,
    /// Ordered by UID ascending; sequence number = 1-based index.
    pub messages: Vec<MailEntry>,
}

impl MailboxView {
    /// `SELECT`/`EXAMINE`: build a fresh view with `\Recent` computed
    /// against the current `last_uid` baseline (none seen yet, so every
    /// message already in the folder at select time counts per spec.md's
    /// `\Recent` rule only for messages that arrive *after*).
    pub async fn select(folder: &dyn Folder, read_only: bool) -> (MailboxView, Vec<String>) {
        let mut view = MailboxView {
            name: folder.name().to_string(),
            read_only,
            uid_validity: folder.uid_validity(),
            last_uid: 0,
            messages: Vec::new(),
        };
        let lines = view.refresh(folder, true).await;
        (view, lines)
    }

    pub fn seqnum_of(&self, uid: u32) -> Option<u32> {
        self.messages.iter().position(|m| m.uid == uid).map(|i| (i + 1) as u32)
    }

    pub fn largest_seqnum(&self) -> u32 {
        self.messages.len() as u32
    }

    pub fn largest_uid(&self) -> u32 {
        self.messages.last().map(|m| m.uid).unwrap_or(0)
    }

    /// Look up this session's current entry for `uid`, the source of truth
    /// for the session-local `\Recent` bit (spec.md §3).
    pub fn entry(&self, uid: u32) -> Option<&MailEntry> {
        self.messages.iter().find(|m| m.uid == uid)
    }

    /// Resolve a command's sequence-set argument into the UIDs it
    /// actually names, in `set`'s ascending order, dropping any resolved
    /// number that doesn't correspond to a message currently in the view
    /// (spec.md §4.C: a stale sequence number just matches nothing).
    pub fn resolve_uids(&self, set: &imap_proto::sequence::SequenceSet, uid_mode: bool) -> Vec<u32> {
        if uid_mode {
            let ids = set.resolve(self.largest_uid());
            ids.into_iter().filter(|id| self.messages.iter().any(|m| m.uid == *id)).collect()
        } else {
            let seqs = set.resolve(self.largest_seqnum());
            seqs.into_iter().filter_map(|s| self.messages.get((s - 1) as usize).map(|m| m.uid)).collect()
        }
    }

    /// spec.md §4.F's `Refresh` algorithm. Returns the untagged response
    /// lines (already CRLF-terminated) this reconciliation produced, in
    /// the required order: per-message `FETCH`/`EXPUNGE` first, then a
    /// trailing `EXISTS`/`RECENT` pair if the message count changed.
    pub async fn refresh(&mut self, folder: &dyn Folder, initial: bool) -> Vec<String> {
        let mut rows = folder.messages().await;
        rows.sort_by_key(|m| m.uid);

        let mut old_index: HashMap<u32, usize> =
            self.messages.iter().enumerate().map(|(i, m)| (m.uid, i)).collect();

        let baseline = self.last_uid;
        let mut new_messages = Vec::with_capacity(rows.len());
        let mut lines = Vec::new();
        let mut added = 0u32;
        let mut recent_count = 0u32;

        for row in &rows {
            if let Some(&old_i) = old_index.get(&row.uid) {
                let old = &self.messages[old_i];
                let recent = old.recent;
                if recent {
                    recent_count += 1;
                }
                if flags_changed(&old.flags, &row.flags) {
                    let seq = new_messages.len() as u32 + 1;
                    lines.push(imap_proto::response::untagged(&format!(
                        "{seq} FETCH (FLAGS {})",
                        flags_to_wire(&with_recent(&row.flags, recent))
                    )));
                }
                new_messages.push(MailEntry { uid: row.uid, flags: row.flags.clone(), recent });
                old_index.remove(&row.uid);
            } else {
                let recent = row.uid > baseline;
                if recent {
                    recent_count += 1;
                }
                added += 1;
                if row.uid > self.last_uid {
                    self.last_uid = row.uid;
                }
                new_messages.push(MailEntry { uid: row.uid, flags: row.flags.clone(), recent });
            }
        }

        // Deletions: whatever's left in `old_index`, emitted in descending
        // old-sequence-number order (spec.md I4) so earlier EXPUNGEs don't
        // shift the sequence numbers of later ones still to be reported.
        let mut deleted_old_seqs: Vec<u32> = old_index.values().map(|&i| (i + 1) as u32).collect();
        deleted_old_seqs.sort_unstable_by(|a, b| b.cmp(a));
        for seq in deleted_old_seqs {
            lines.push(imap_proto::response::untagged(&format!("{seq} EXPUNGE")));
        }

        self.messages = new_messages;

        if added > 0 || initial {
            lines.push(imap_proto::response::untagged(&format!("{} EXISTS", self.messages.len())));
            lines.push(imap_proto::response::untagged(&format!("{recent_count} RECENT")));
        }

        lines
    }
}

fn flags_changed(old: &[Flag], new: &[Flag]) -> bool {
    old.len() != new.len() || old.iter().any(|f| !new.contains(f))
}

fn with_recent(flags: &[Flag], recent: bool) -> Vec<Flag> {
    let mut out = flags.to_vec();
    if recent && !out.contains(&Flag::Recent) {
        out.push(Flag::Recent);
    }
    out
}

/// Render one message's `FETCH (FLAGS (...) UID n)` line, used by STORE
/// (spec.md §4.I) outside of a full refresh.
pub fn render_flags_fetch(seq: u32, uid: u32, flags: &[Flag]) -> String {
    imap_proto::response::untagged(&format!("{seq} FETCH (FLAGS {} UID {uid})", flags_to_wire(flags)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use imap_proto::command::StoreOp;
    use imap_proto::section::Section;
    use std::sync::{Arc, Mutex};
    use store::{Envelope, FolderCounters, MessageMeta, StoreError};

    struct FakeFolder {
        messages: Mutex<Vec<MessageMeta>>,
    }

    #[async_trait]
    impl Folder for FakeFolder {
        fn name(&self) -> &str {
            "INBOX"
        }
        fn read_write(&self) -> bool {
            true
        }
        fn uid_validity(&self) -> u32 {
            1
        }
        fn uid_next(&self) -> u32 {
            self.messages.lock().unwrap().len() as u32 + 1
        }
        fn counters(&self) -> FolderCounters {
            FolderCounters::default()
        }
        async fn messages(&self) -> Vec<MessageMeta> {
            self.messages.lock().unwrap().clone()
        }
        async fn raw(&self, _uid: u32) -> Result<Arc<Vec<u8>>, StoreError> {
            unimplemented!()
        }
        async fn envelope(&self, _uid: u32) -> Result<Envelope, StoreError> {
            unimplemented!()
        }
        async fn section(&self, _uid: u32, _section: &Section) -> Result<Vec<u8>, StoreError> {
            unimplemented!()
        }
        async fn append(&self, _m: Vec<u8>, _f: Vec<Flag>, _d: Option<DateTime<Utc>>) -> Result<u32, StoreError> {
            unimplemented!()
        }
        async fn store_flags(&self, _u: u32, _op: StoreOp, _f: &[Flag]) -> Result<Vec<Flag>, StoreError> {
            unimplemented!()
        }
        async fn copy_to(&self, _u: u32, _d: &dyn Folder) -> Result<u32, StoreError> {
            unimplemented!()
        }
        async fn expunge(&self) -> Result<Vec<u32>, StoreError> {
            unimplemented!()
        }
        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn meta(uid: u32, flags: Vec<Flag>) -> MessageMeta {
        MessageMeta { uid, flags, internal_date: Utc::now(), size: 10 }
    }

    #[tokio::test]
    async fn initial_select_reports_exists_and_recent() {
        let folder = FakeFolder { messages: Mutex::new(vec![meta(1, vec![]), meta(2, vec![])]) };
        let (view, lines) = MailboxView::select(&folder, false).await;
        assert_eq!(view.messages.len(), 2);
        assert!(lines.iter().any(|l| l == "* 2 EXISTS\r\n"));
        assert!(lines.iter().any(|l| l == "* 2 RECENT\r\n"));
    }

    #[tokio::test]
    async fn new_arrival_after_select_is_recent_and_flag_change_is_reported() {
        let folder = FakeFolder { messages: Mutex::new(vec![meta(1, vec![])]) };
        let (mut view, _) = MailboxView::select(&folder, false).await;
        assert_eq!(view.last_uid, 1);

        folder.messages.lock().unwrap().push(meta(2, vec![]));
        folder.messages.lock().unwrap()[0].flags = vec![Flag::Seen];
        let lines = view.refresh(&folder, false).await;

        assert!(lines.iter().any(|l| l.contains("1 FETCH (FLAGS (\\Seen))")));
        assert!(lines.iter().any(|l| l == "* 2 EXISTS\r\n"));
        assert!(lines.iter().any(|l| l == "* 1 RECENT\r\n"));
        assert!(view.messages[1].recent);
        assert!(!view.messages[0].recent);
    }

    #[tokio::test]
    async fn expunge_emits_descending_old_seqnums() {
        let folder = FakeFolder { messages: Mutex::new(vec![meta(1, vec![]), meta(2, vec![]), meta(3, vec![])]) };
        let (mut view, _) = MailboxView::select(&folder, false).await;

        folder.messages.lock().unwrap().retain(|m| m.uid != 1 && m.uid != 2);
        let lines = view.refresh(&folder, false).await;
        let positions: Vec<usize> =
            lines.iter().enumerate().filter(|(_, l)| l.contains("EXPUNGE")).map(|(i, _)| i).collect();
        assert_eq!(lines[positions[0]], "* 2 EXPUNGE\r\n");
        assert_eq!(lines[positions[1]], "* 1 EXPUNGE\r\n");
        assert_eq!(view.messages.len(), 1);
    }
}
