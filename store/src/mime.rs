//! MIME parsing: envelope extraction, body structure, and section slicing.
//!
//! Grounded on the pack's `mailparse` usage (`berker-z-otto`'s
//! `sanitize::sanitize`, which walks a `ParsedMail` via `MailHeaderMap` and
//! `subparts`) rather than a hand-rolled RFC 5322/2045 parser.

use crate::error::StoreError;
use crate::types::{Address, BodyStructure, Envelope};
use imap_proto::section::{Section, SectionText};
use mailparse::{addrparse, MailAddr, MailHeaderMap, ParsedMail, SingleInfo};

pub fn parse(raw: &[u8]) -> Result<ParsedMail<'_>, StoreError> {
    Ok(mailparse::parse_mail(raw)?)
}

pub fn envelope(mail: &ParsedMail) -> Envelope {
    let headers = &mail.headers;
    Envelope {
        date: headers.get_first_value("Date"),
        subject: headers.get_first_value("Subject"),
        from: addresses(headers.get_first_value("From").as_deref()),
        sender: addresses(headers.get_first_value("Sender").as_deref()),
        reply_to: addresses(headers.get_first_value("Reply-To").as_deref()),
        to: addresses(headers.get_first_value("To").as_deref()),
        cc: addresses(headers.get_first_value("Cc").as_deref()),
        bcc: addresses(headers.get_first_value("Bcc").as_deref()),
        in_reply_to: headers.get_first_value("In-Reply-To"),
        message_id: headers.get_first_value("Message-ID"),
    }
}

fn addresses(header: Option<&str>) -> Vec<Address> {
    let Some(header) = header else {
        return Vec::new();
    };
    let Ok(parsed) = addrparse(header) else {
        return Vec::new();
    };
    parsed.iter().flat_map(flatten_addr).map(to_address).collect()
}

fn flatten_addr(addr: &MailAddr) -> Vec<SingleInfo> {
    match addr {
        MailAddr::Single(info) => vec![info.clone()],
        MailAddr::Group(group) => group.addrs.clone(),
    }
}

fn to_address(info: SingleInfo) -> Address {
    let (mailbox, host) = info.addr.split_once('@').unwrap_or((info.addr.as_str(), ""));
    Address { name: info.display_name, mailbox: mailbox.to_string(), host: host.to_string() }
}

pub fn body_structure(mail: &ParsedMail) -> BodyStructure {
    let ctype = &mail.ctype;
    BodyStructure {
        mime_type: ctype.mimetype.split('/').next().unwrap_or("text").to_string(),
        mime_subtype: ctype.mimetype.split('/').nth(1).unwrap_or("plain").to_string(),
        parameters: ctype.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        size: mail.get_body_raw().map(|b| b.len() as u32).unwrap_or(0),
        parts: mail.subparts.iter().map(body_structure).collect(),
    }
}

/// Resolve a [`Section`] against a parsed message and return the exact
/// bytes `BODY[section]` wants.
pub fn section_bytes(mail: &ParsedMail, raw: &[u8], section: &Section) -> Result<Vec<u8>, StoreError> {
    let part = navigate(mail, &section.part)?;

    match &section.text {
        SectionText::Full => {
            if section.part.is_empty() {
                Ok(raw.to_vec())
            } else {
                Ok(part.raw_bytes.to_vec())
            }
        }
        SectionText::Header => Ok(header_block(part, |_| true)),
        SectionText::HeaderFields(names) => {
            Ok(header_block(part, |name| names.iter().any(|n| n.eq_ignore_ascii_case(name))))
        }
        SectionText::HeaderFieldsNot(names) => {
            Ok(header_block(part, |name| !names.iter().any(|n| n.eq_ignore_ascii_case(name))))
        }
        SectionText::Text => Ok(part.get_body_raw().unwrap_or_default()),
        SectionText::Mime => Ok(header_block(part, |_| true)),
    }
}

fn navigate<'a>(mail: &'a ParsedMail<'a>, path: &[u32]) -> Result<&'a ParsedMail<'a>, StoreError> {
    let mut current = mail;
    for &index in path {
        let idx = index as usize;
        if idx == 0 {
            return Err(StoreError::Mime(format!("invalid section part {index}")));
        }
        current = current
            .subparts
            .get(idx - 1)
            .ok_or_else(|| StoreError::Mime(format!("no such section part {index}")))?;
    }
    Ok(current)
}

fn header_block(part: &ParsedMail, keep: impl Fn(&str) -> bool) -> Vec<u8> {
    let mut out = String::new();
    for header in &part.headers {
        if keep(header.get_key_ref()) {
            out.push_str(header.get_key_ref());
            out.push_str(": ");
            out.push_str(&header.get_value());
            out.push_str("\r\n");
        }
    }
    out.push_str("\r\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: Hi\r\n\r\nHello there.\r\n";

    #[test]
    fn envelope_extracts_subject_and_from() {
        let mail = parse(SAMPLE).unwrap();
        let env = envelope(&mail);
        assert_eq!(env.subject.as_deref(), Some("Hi"));
        assert_eq!(env.from[0].mailbox, "alice");
        assert_eq!(env.from[0].host, "example.com");
    }

    #[test]
    fn whole_message_section_is_the_raw_bytes() {
        let mail = parse(SAMPLE).unwrap();
        let section = Section::default();
        let bytes = section_bytes(&mail, SAMPLE, &section).unwrap();
        assert_eq!(bytes, SAMPLE);
    }

    #[test]
    fn header_fields_section_filters_by_name() {
        let mail = parse(SAMPLE).unwrap();
        let section = Section { part: vec![], text: SectionText::HeaderFields(vec!["SUBJECT".into()]) };
        let bytes = section_bytes(&mail, SAMPLE, &section).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Subject: Hi"));
        assert!(!text.contains("From:"));
    }

    #[test]
    fn text_section_is_the_body_only() {
        let mail = parse(SAMPLE).unwrap();
        let section = Section { part: vec![], text: SectionText::Text };
        let bytes = section_bytes(&mail, SAMPLE, &section).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().trim(), "Hello there.");
    }
}
