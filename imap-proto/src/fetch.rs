//! FETCH data-item names (spec.md §4.H), the wire-level half of Component H.
//!
//! Parses the item tokens a `FETCH`/`UID FETCH` command carries (already
//! split out of their enclosing `(...)` group by [`crate::command::parse`])
//! into typed [`FetchItem`]s. Expanding a fetched value against the store
//! and rendering the FETCH response line is the gateway's job, not this
//! crate's — this module only knows the wire vocabulary.

use crate::section::{parse_partial, parse_section, Partial, Section};
use crate::tokenizer::Token;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchItemError {
    #[error("unknown FETCH data item {0:?}")]
    Unknown(String),
    #[error("malformed FETCH data item {0:?}: {1}")]
    Malformed(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Flags,
    Uid,
    InternalDate,
    Rfc822Size,
    Envelope,
    BodyStructure,
    /// `BODY` with no section: a non-extensible BODYSTRUCTURE variant.
    Body,
    Rfc822,
    Rfc822Header,
    Rfc822Text,
    BodySection { peek: bool, section: Section, partial: Option<Partial> },
}

/// Whether `next` is a `[section]` group, i.e. whether the preceding
/// `BODY`/`BODY.PEEK` atom is the section form rather than the bare item.
fn starts_section(next: Option<&Token>) -> bool {
    matches!(next, Some(Token::Group(raw)) if raw.first() == Some(&b'['))
}

/// Expand `ALL`/`FAST`/`FULL` macros and otherwise parse the item tokens
/// one by one. A bare atom `BODY`/`BODY.PEEK` followed immediately by a
/// `[...]` group token is a section fetch; any other plain atom is a named
/// item; a standalone `<...>` atom never appears outside that pairing.
pub fn parse_items(tokens: &[Token]) -> Result<Vec<FetchItem>, FetchItemError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let name = tok
            .as_str()
            .ok_or_else(|| FetchItemError::Malformed("<binary>".into(), "not UTF-8".into()))?;
        let upper = name.to_ascii_uppercase();

        match upper.as_str() {
            "ALL" => {
                out.extend([FetchItem::Flags, FetchItem::InternalDate, FetchItem::Rfc822Size, FetchItem::Envelope]);
                i += 1;
            }
            "FAST" => {
                out.extend([FetchItem::Flags, FetchItem::InternalDate, FetchItem::Rfc822Size]);
                i += 1;
            }
            "FULL" => {
                out.extend([
                    FetchItem::Flags,
                    FetchItem::InternalDate,
                    FetchItem::Rfc822Size,
                    FetchItem::Envelope,
                    FetchItem::BodyStructure,
                ]);
                i += 1;
            }
            "FLAGS" => {
                out.push(FetchItem::Flags);
                i += 1;
            }
            "UID" => {
                out.push(FetchItem::Uid);
                i += 1;
            }
            "INTERNALDATE" => {
                out.push(FetchItem::InternalDate);
                i += 1;
            }
            "RFC822.SIZE" => {
                out.push(FetchItem::Rfc822Size);
                i += 1;
            }
            "ENVELOPE" => {
                out.push(FetchItem::Envelope);
                i += 1;
            }
            "BODYSTRUCTURE" => {
                out.push(FetchItem::BodyStructure);
                i += 1;
            }
            "BODY" if !starts_section(tokens.get(i + 1)) => {
                out.push(FetchItem::Body);
                i += 1;
            }
            "RFC822" => {
                out.push(FetchItem::Rfc822);
                i += 1;
            }
            "RFC822.HEADER" => {
                out.push(FetchItem::Rfc822Header);
                i += 1;
            }
            "RFC822.TEXT" => {
                out.push(FetchItem::Rfc822Text);
                i += 1;
            }
            _ => {
                // BODY / BODY.PEEK followed by a `[section]` group token, optionally
                // followed by a `<partial>` atom.
                let peek = match upper.as_str() {
                    "BODY" => false,
                    "BODY.PEEK" => true,
                    other => return Err(FetchItemError::Unknown(other.to_string())),
                };
                i += 1;
                let group = tokens.get(i).ok_or_else(|| {
                    FetchItemError::Malformed(name.to_string(), "missing [section]".into())
                })?;
                let Token::Group(raw) = group else {
                    return Err(FetchItemError::Malformed(name.to_string(), "expected [section]".into()));
                };
                if raw.first() != Some(&b'[') {
                    return Err(FetchItemError::Malformed(name.to_string(), "expected [section]".into()));
                }
                let section = parse_section(&raw[1..raw.len() - 1])
                    .map_err(|e| FetchItemError::Malformed(name.to_string(), e.to_string()))?;
                i += 1;

                let mut partial = None;
                if let Some(next) = tokens.get(i) {
                    if let Some(s) = next.as_str() {
                        if s.starts_with('<') {
                            partial = Some(
                                parse_partial(s)
                                    .map_err(|e| FetchItemError::Malformed(name.to_string(), e.to_string()))?,
                            );
                            i += 1;
                        }
                    }
                }

                out.push(FetchItem::BodySection { peek, section, partial });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn items(s: &str) -> Vec<FetchItem> {
        let tokens = tokenize(s.as_bytes()).unwrap();
        parse_items(&tokens).unwrap()
    }

    #[test]
    fn macros_expand() {
        assert_eq!(items("FAST"), vec![FetchItem::Flags, FetchItem::InternalDate, FetchItem::Rfc822Size]);
    }

    #[test]
    fn plain_named_items() {
        assert_eq!(items("FLAGS UID"), vec![FetchItem::Flags, FetchItem::Uid]);
    }

    #[test]
    fn body_peek_header_fields_with_partial() {
        let parsed = items("BODY.PEEK[HEADER.FIELDS (SUBJECT)]<0.100>");
        match &parsed[0] {
            FetchItem::BodySection { peek, partial, .. } => {
                assert!(peek);
                assert_eq!(*partial, Some(Partial { start: 0, length: Some(100) }));
            }
            _ => panic!("expected BodySection"),
        }
    }

    #[test]
    fn body_with_empty_section_is_whole_message() {
        let parsed = items("BODY[]");
        match &parsed[0] {
            FetchItem::BodySection { peek, section, partial } => {
                assert!(!peek);
                assert_eq!(section.part, Vec::<u32>::new());
                assert_eq!(*partial, None);
            }
            _ => panic!("expected BodySection"),
        }
    }

    #[test]
    fn unknown_item_is_an_error() {
        let tokens = tokenize(b"BOGUS").unwrap();
        assert!(parse_items(&tokens).is_err());
    }
}
