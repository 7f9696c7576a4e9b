//! Component G: compiling a [`SearchKey`] tree against the selected
//! mailbox (spec.md §4.G).
//!
//! The real MAPI-backed store would let most of this run as a restriction
//! evaluated by the backend's indexer; this gateway's simplified
//! [`store::Store`] has no restriction-query primitive, so every criterion
//! is evaluated locally against each candidate message's metadata/envelope/
//! body, fetched on demand through [`store::Folder`]. The AND-wrapping
//! spec.md mentions (keeping the query "out of the indexer's path") has no
//! counterpart here and is therefore a no-op, noted in `DESIGN.md`.

use crate::error::GatewayError;
use crate::mailbox_view::MailboxView;
use chrono::NaiveDate;
use imap_proto::datetime::parse_date;
use imap_proto::flag::Flag;
use imap_proto::search::SearchKey;
use store::Folder;

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

async fn eval(
    folder: &dyn Folder,
    view: &MailboxView,
    uid: u32,
    meta: &store::MessageMeta,
    recent: bool,
    key: &SearchKey,
) -> Result<bool, GatewayError> {
    Ok(match key {
        SearchKey::All => true,
        SearchKey::Answered => meta.flags.contains(&Flag::Answered),
        SearchKey::Unanswered => !meta.flags.contains(&Flag::Answered),
        SearchKey::Deleted => meta.flags.contains(&Flag::Deleted),
        SearchKey::Undeleted => !meta.flags.contains(&Flag::Deleted),
        SearchKey::Draft => meta.flags.contains(&Flag::Draft),
        SearchKey::Undraft => !meta.flags.contains(&Flag::Draft),
        SearchKey::Flagged => meta.flags.contains(&Flag::Flagged),
        SearchKey::Unflagged => !meta.flags.contains(&Flag::Flagged),
        SearchKey::Seen => meta.flags.contains(&Flag::Seen),
        SearchKey::Unseen => !meta.flags.contains(&Flag::Seen),
        SearchKey::New => recent && !meta.flags.contains(&Flag::Seen),
        SearchKey::Old => !recent,
        SearchKey::Recent => recent,
        SearchKey::Keyword(_) => false,
        SearchKey::Unkeyword(_) => true,
        SearchKey::Bcc(s) => envelope_field(folder, uid, Field::Bcc, s).await?,
        SearchKey::Cc(s) => envelope_field(folder, uid, Field::Cc, s).await?,
        SearchKey::From(s) => envelope_field(folder, uid, Field::From, s).await?,
        SearchKey::To(s) => envelope_field(folder, uid, Field::To, s).await?,
        SearchKey::Subject(s) => {
            let env = folder.envelope(uid).await?;
            env.subject.as_deref().map(|subj| contains_ci(subj, s)).unwrap_or(false)
        }
        SearchKey::Text(s) => {
            let raw = folder.raw(uid).await?;
            contains_ci(&String::from_utf8_lossy(&raw), s)
        }
        SearchKey::Body(s) => {
            let body = folder.section(uid, &imap_proto::section::Section {
                part: vec![],
                text: imap_proto::section::SectionText::Text,
            }).await?;
            contains_ci(&String::from_utf8_lossy(&body), s)
        }
        SearchKey::Header(name, value) => {
            let headers = folder
                .section(uid, &imap_proto::section::Section {
                    part: vec![],
                    text: imap_proto::section::SectionText::HeaderFields(vec![name.clone()]),
                })
                .await?;
            contains_ci(&String::from_utf8_lossy(&headers), value)
        }
        SearchKey::Before(d) => compare_date(meta.internal_date.date_naive(), d, Ordering::Before)?,
        SearchKey::On(d) => compare_date(meta.internal_date.date_naive(), d, Ordering::On)?,
        SearchKey::Since(d) => compare_date(meta.internal_date.date_naive(), d, Ordering::Since)?,
        SearchKey::SentBefore(d) | SearchKey::SentOn(d) | SearchKey::SentSince(d) => {
            // No distinct `clientSubmitTime` in this Store Interface;
            // fall back to `internal_date`, matching `BEFORE`/`ON`/`SINCE`.
            let ord = match key {
                SearchKey::SentBefore(_) => Ordering::Before,
                SearchKey::SentOn(_) => Ordering::On,
                _ => Ordering::Since,
            };
            compare_date(meta.internal_date.date_naive(), d, ord)?
        }
        SearchKey::Larger(n) => meta.size > *n,
        SearchKey::Smaller(n) => meta.size < *n,
        SearchKey::Uid(set) => set.to_predicate_plan(view.largest_uid()).matches(uid),
        SearchKey::SequenceSet(set) => {
            let seq = view.seqnum_of(uid).unwrap_or(0);
            set.to_predicate_plan(view.largest_seqnum()).matches(seq)
        }
        SearchKey::Not(inner) => !Box::pin(eval(folder, view, uid, meta, recent, inner)).await?,
        SearchKey::Or(a, b) => {
            Box::pin(eval(folder, view, uid, meta, recent, a)).await?
                || Box::pin(eval(folder, view, uid, meta, recent, b)).await?
        }
        SearchKey::And(keys) => {
            for k in keys {
                if !Box::pin(eval(folder, view, uid, meta, recent, k)).await? {
                    return Ok(false);
                }
            }
            true
        }
    })
}

enum Field {
    From,
    To,
    Cc,
    Bcc,
}

async fn envelope_field(folder: &dyn Folder, uid: u32, field: Field, needle: &str) -> Result<bool, GatewayError> {
    let env = folder.envelope(uid).await?;
    let addrs = match field {
        Field::From => &env.from,
        Field::To => &env.to,
        Field::Cc => &env.cc,
        Field::Bcc => &env.bcc,
    };
    Ok(addrs.iter().any(|a| {
        a.name.as_deref().map(|n| contains_ci(n, needle)).unwrap_or(false)
            || contains_ci(&a.mailbox, needle)
            || contains_ci(&a.host, needle)
    }))
}

enum Ordering {
    Before,
    On,
    Since,
}

fn compare_date(actual: NaiveDate, wire: &str, ord: Ordering) -> Result<bool, GatewayError> {
    let target = parse_date(wire).map_err(|e| GatewayError::CallFailed(e.to_string()))?;
    Ok(match ord {
        Ordering::Before => actual < target,
        Ordering::On => actual == target,
        Ordering::Since => actual >= target,
    })
}

/// Evaluate `key` against every message in the selected mailbox and return
/// matching UIDs in ascending order. The root is conceptually
/// `AND(EXISTS(...), key)` per spec.md §4.G; since every candidate already
/// comes from the mailbox view, existence is implicit.
pub async fn search(folder: &dyn Folder, view: &MailboxView, key: &SearchKey) -> Result<Vec<u32>, GatewayError> {
    let metas = folder.messages().await;
    let mut out = Vec::new();
    for meta in &metas {
        let recent = view.messages.iter().find(|m| m.uid == meta.uid).map(|m| m.recent).unwrap_or(false);
        if eval(folder, view, meta.uid, meta, recent, key).await? {
            out.push(meta.uid);
        }
    }
    out.sort_unstable();
    Ok(out)
}
