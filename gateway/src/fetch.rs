//! Component H: the fetch engine (spec.md §4.H).
//!
//! Gathers requested data items for a set of UIDs and renders the
//! `* <seq> FETCH (...)` response line for each, in the items' original
//! request order. Body-section bytes always go out octet-counted
//! (`{N}\r\n<bytes>`) since a message body is arbitrary binary, never as a
//! quoted string.

use crate::error::GatewayError;
use crate::mailbox_view::MailboxView;
use imap_proto::datetime::format_date;
use imap_proto::fetch::FetchItem;
use imap_proto::flag::{flags_to_wire, Flag};
use imap_proto::section::{Partial, Section};
use store::{Address, BodyStructure, Envelope, Folder};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn nil_or_quote(s: Option<&str>) -> String {
    match s {
        Some(s) => quote(s),
        None => "NIL".to_string(),
    }
}

fn addr_list(addrs: &[Address]) -> String {
    if addrs.is_empty() {
        return "NIL".to_string();
    }
    let rendered: Vec<String> = addrs
        .iter()
        .map(|a| {
            format!(
                "({} NIL {} {})",
                nil_or_quote(a.name.as_deref()),
                quote(&a.mailbox),
                quote(&a.host)
            )
        })
        .collect();
    format!("({})", rendered.join(" "))
}

fn render_envelope(env: &Envelope) -> String {
    format!(
        "({} {} {} {} {} {} {} {} {} {})",
        nil_or_quote(env.date.as_deref()),
        nil_or_quote(env.subject.as_deref()),
        addr_list(&env.from),
        addr_list(&env.sender),
        addr_list(&env.reply_to),
        addr_list(&env.to),
        addr_list(&env.cc),
        addr_list(&env.bcc),
        nil_or_quote(env.in_reply_to.as_deref()),
        nil_or_quote(env.message_id.as_deref()),
    )
}

/// Non-extensible BODY / BODYSTRUCTURE rendering. Multipart messages
/// render as `(part part ... "subtype")`; leaf parts render as
/// `("type" "subtype" (params) NIL NIL "7BIT" size)`.
fn render_body_structure(bs: &BodyStructure) -> String {
    if !bs.parts.is_empty() {
        let parts: Vec<String> = bs.parts.iter().map(render_body_structure).collect();
        return format!("({} {})", parts.join(" "), quote(&bs.mime_subtype));
    }
    let params = if bs.parameters.is_empty() {
        "NIL".to_string()
    } else {
        let pairs: Vec<String> = bs.parameters.iter().flat_map(|(k, v)| [quote(k), quote(v)]).collect();
        format!("({})", pairs.join(" "))
    };
    format!(
        "({} {} {} NIL NIL \"7BIT\" {})",
        quote(&bs.mime_type),
        quote(&bs.mime_subtype),
        params,
        bs.size
    )
}

fn apply_partial(bytes: Vec<u8>, partial: &Option<Partial>) -> Vec<u8> {
    let Some(p) = partial else {
        return bytes;
    };
    let start = (p.start as usize).min(bytes.len());
    match p.length {
        Some(len) => bytes[start..(start + len as usize).min(bytes.len())].to_vec(),
        None => bytes[start..].to_vec(),
    }
}

fn literal(label: &str, bytes: &[u8]) -> String {
    format!("{label} {{{}}}\r\n{}", bytes.len(), String::from_utf8_lossy(bytes))
}

async fn render_item(
    folder: &dyn Folder,
    uid: u32,
    flags: &[Flag],
    internal_date: &chrono::DateTime<chrono::Utc>,
    size: u32,
    item: &FetchItem,
    mark_seen: &mut bool,
) -> Result<String, GatewayError> {
    Ok(match item {
        FetchItem::Flags => format!("FLAGS {}", flags_to_wire(flags)),
        FetchItem::Uid => format!("UID {uid}"),
        FetchItem::InternalDate => format!("INTERNALDATE {}", quote(&format_date(&internal_date.date_naive()))),
        FetchItem::Rfc822Size => format!("RFC822.SIZE {size}"),
        FetchItem::Envelope => {
            let env = folder.envelope(uid).await?;
            format!("ENVELOPE {}", render_envelope(&env))
        }
        FetchItem::BodyStructure | FetchItem::Body => {
            let raw = folder.raw(uid).await?;
            let mail = store::mime::parse(&raw)?;
            let bs = store::mime::body_structure(&mail);
            let label = if matches!(item, FetchItem::Body) { "BODY" } else { "BODYSTRUCTURE" };
            format!("{label} {}", render_body_structure(&bs))
        }
        FetchItem::Rfc822 => {
            let raw = folder.raw(uid).await?;
            *mark_seen = true;
            literal("RFC822", &raw)
        }
        FetchItem::Rfc822Header => {
            let header_section = Section { part: vec![], text: imap_proto::section::SectionText::Header };
            let bytes = folder.section(uid, &header_section).await?;
            literal("RFC822.HEADER", &bytes)
        }
        FetchItem::Rfc822Text => {
            let bytes = folder
                .section(uid, &Section { part: vec![], text: imap_proto::section::SectionText::Text })
                .await?;
            *mark_seen = true;
            literal("RFC822.TEXT", &bytes)
        }
        FetchItem::BodySection { peek, section, partial } => {
            let bytes = folder.section(uid, section).await?;
            let bytes = apply_partial(bytes, partial);
            if !peek {
                *mark_seen = true;
            }
            literal(&format!("BODY[{}]", render_section_label(section)), &bytes)
        }
    })
}

fn render_section_label(section: &Section) -> String {
    use imap_proto::section::SectionText::*;
    let path = if section.part.is_empty() {
        String::new()
    } else {
        section.part.iter().map(u32::to_string).collect::<Vec<_>>().join(".")
    };
    let text = match &section.text {
        Full => String::new(),
        Header => "HEADER".to_string(),
        Text => "TEXT".to_string(),
        Mime => "MIME".to_string(),
        HeaderFields(names) => format!("HEADER.FIELDS ({})", names.join(" ")),
        HeaderFieldsNot(names) => format!("HEADER.FIELDS.NOT ({})", names.join(" ")),
    };
    match (path.is_empty(), text.is_empty()) {
        (true, true) => String::new(),
        (true, false) => text,
        (false, true) => path,
        (false, false) => format!("{path}.{text}"),
    }
}

/// Fetch `items` for every UID in `uids` (already resolved by the caller
/// from the command's sequence-set) and render the FETCH response lines,
/// in mailbox order. Returns the rendered lines plus the set of UIDs that
/// must be marked `\Seen` as a side effect (spec.md §4.H's mark-as-read
/// rule — the caller applies it in one batch after this returns).
pub async fn fetch(
    folder: &dyn Folder,
    view: &MailboxView,
    uids: &[u32],
    items: &[FetchItem],
) -> Result<(Vec<String>, Vec<u32>), GatewayError> {
    let metas = folder.messages().await;
    let mut lines = Vec::new();
    let mut to_mark_seen = Vec::new();

    for &uid in uids {
        let Some(seq) = view.seqnum_of(uid) else { continue };
        let Some(meta) = metas.iter().find(|m| m.uid == uid) else { continue };
        let Some(entry) = view.entry(uid) else { continue };
        let flags = entry.flags_with_recent();

        let mut fragments = Vec::with_capacity(items.len());
        let mut mark_seen = false;
        for item in items {
            fragments.push(render_item(folder, uid, &flags, &meta.internal_date, meta.size, item, &mut mark_seen).await?);
        }
        if mark_seen {
            to_mark_seen.push(uid);
        }
        lines.push(imap_proto::response::untagged(&format!("{seq} FETCH ({})", fragments.join(" "))));
    }

    Ok((lines, to_mark_seen))
}
