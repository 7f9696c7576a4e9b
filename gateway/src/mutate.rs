//! Component I: mutating commands (spec.md §4.I) — `APPEND`, `STORE`,
//! `COPY`, `XAOL-MOVE`, `EXPUNGE`/`UID EXPUNGE`.
//!
//! Each function returns whatever the tagged `OK` response needs (a
//! [`Code`] for APPENDUID/COPYUID) plus any untagged lines the dispatcher
//! must send first — STORE's per-message FETCH lines and EXPUNGE's
//! EXPUNGE lines both come from [`MailboxView`], keeping the sequence-
//! number bookkeeping in one place (spec.md I4: descending old-seqnum
//! order on expunge).

use chrono::{DateTime, TimeZone, Utc};
use imap_proto::command::StoreOp;
use imap_proto::datetime::parse_internal_date;
use imap_proto::flag::Flag;
use imap_proto::response::Code;
use store::Folder;

use crate::error::GatewayError;
use crate::mailbox_view::{render_flags_fetch, MailboxView};

/// `APPEND`: parse the optional `INTERNALDATE` wire string, store the
/// message with the given flags, and return the `APPENDUID` code.
pub async fn append(
    folder: &dyn Folder,
    message: Vec<u8>,
    flags: Vec<Flag>,
    date: Option<&str>,
) -> Result<Code, GatewayError> {
    let internal_date = match date {
        Some(d) => Some(to_utc(d)?),
        None => None,
    };
    let uid = folder.append(message, flags, internal_date).await?;
    Ok(Code::AppendUid(folder.uid_validity(), uid))
}

fn to_utc(wire: &str) -> Result<DateTime<Utc>, GatewayError> {
    let (naive, offset_minutes) = parse_internal_date(wire).map_err(|e| GatewayError::CallFailed(e.to_string()))?;
    let offset = chrono::FixedOffset::east_opt(offset_minutes * 60)
        .ok_or_else(|| GatewayError::CallFailed("invalid INTERNALDATE offset".into()))?;
    let with_offset = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| GatewayError::CallFailed("ambiguous INTERNALDATE".into()))?;
    Ok(with_offset.with_timezone(&Utc))
}

/// `STORE`: apply `op` to every UID, rendering one `FETCH (FLAGS ...)`
/// line per message unless `.SILENT` was requested.
pub async fn store(
    folder: &dyn Folder,
    view: &MailboxView,
    uids: &[u32],
    op: StoreOp,
    flags: &[Flag],
    silent: bool,
) -> Result<Vec<String>, GatewayError> {
    if !folder.read_write() {
        return Err(GatewayError::NoAccess("mailbox is read-only".into()));
    }
    let mut lines = Vec::new();
    for &uid in uids {
        let resulting = folder.store_flags(uid, op, flags).await?;
        if !silent {
            if let Some(seq) = view.seqnum_of(uid) {
                // STORE never changes recency; fold in this session's
                // `\Recent` bit rather than forwarding the store's raw
                // flags (spec.md §3).
                let rendered = view.entry(uid).map(|e| e.merge_recent(&resulting)).unwrap_or(resulting);
                lines.push(render_flags_fetch(seq, uid, &rendered));
            }
        }
    }
    Ok(lines)
}

/// `COPY`: duplicate every UID into `dest`, returning the `COPYUID` code.
pub async fn copy(folder: &dyn Folder, dest: &dyn Folder, uids: &[u32]) -> Result<Code, GatewayError> {
    let mut dest_uids = Vec::with_capacity(uids.len());
    for &uid in uids {
        dest_uids.push(folder.copy_to(uid, dest).await?);
    }
    Ok(Code::CopyUid(dest.uid_validity(), render_uid_set(uids), render_uid_set(&dest_uids)))
}

/// `XAOL-MOVE`: copy then mark the source `\Deleted` and expunge it
/// immediately, since this gateway always expunges deletions inline
/// rather than deferring to a later `CLOSE` (spec.md I4's "delete on
/// move" note).
pub async fn move_to(
    folder: &dyn Folder,
    view: &mut MailboxView,
    dest: &dyn Folder,
    uids: &[u32],
) -> Result<(Code, Vec<String>), GatewayError> {
    let code = copy(folder, dest, uids).await?;
    for &uid in uids {
        folder.store_flags(uid, StoreOp::Add, &[Flag::Deleted]).await?;
    }
    let lines = expunge(folder, view).await?;
    Ok((code, lines))
}

/// `EXPUNGE` / `UID EXPUNGE <set>`: remove every `\Deleted` message and
/// refresh the view so the resulting `EXPUNGE` lines carry correct,
/// descending old sequence numbers. This Store Interface has no
/// selective-expunge primitive, so `UID EXPUNGE <set>` and plain
/// `EXPUNGE` behave identically here — recorded as an Open Question
/// decision in `DESIGN.md`.
pub async fn expunge(folder: &dyn Folder, view: &mut MailboxView) -> Result<Vec<String>, GatewayError> {
    if !folder.read_write() {
        return Err(GatewayError::NoAccess("mailbox is read-only".into()));
    }
    folder.expunge().await?;
    Ok(view.refresh(folder, false).await)
}

fn render_uid_set(uids: &[u32]) -> String {
    uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}
