//! `BODY[section]<partial>` addressing grammar (spec.md §4.H).
//!
//! `section-part` (`1.2.3`) addresses a MIME sub-part by its 1-based path
//! from the top; `section-text` (`HEADER`, `TEXT`, `MIME`,
//! `HEADER.FIELDS (...)`, `HEADER.FIELDS.NOT (...)`) selects a facet of
//! whichever part the path names, or the whole message if there's no path.

use crate::tokenizer::{tokenize, tokenize_group_contents, Token, TokenizeError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    #[error("malformed section: {0}")]
    Malformed(String),
}

impl From<TokenizeError> for SectionError {
    fn from(e: TokenizeError) -> Self {
        SectionError::Malformed(format!("{e:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionText {
    /// Empty section spec: the entire part (headers + body).
    Full,
    Header,
    HeaderFields(Vec<String>),
    HeaderFieldsNot(Vec<String>),
    Text,
    Mime,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    /// 1-based path to a MIME sub-part, e.g. `[1, 2]` for `1.2`. Empty
    /// means "the top-level message".
    pub part: Vec<u32>,
    pub text: SectionText,
}

impl Default for SectionText {
    fn default() -> Self {
        SectionText::Full
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub start: u32,
    pub length: Option<u32>,
}

/// Parse the raw bytes between a `BODY[` / `BODY.PEEK[` token's brackets
/// (i.e. the content of a [`Token::Group`] with its own outer `[`/`]` already stripped).
pub fn parse_section(inner: &[u8]) -> Result<Section, SectionError> {
    if inner.is_empty() {
        return Ok(Section::default());
    }

    let text = std::str::from_utf8(inner).map_err(|_| SectionError::Malformed("not UTF-8".into()))?;

    // Split off a leading dotted numeric path: "1.2.HEADER" -> (["1","2"], "HEADER")
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (head, tail) = match rest.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };
        if head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty() {
            parts.push(head.parse::<u32>().map_err(|_| SectionError::Malformed(text.into()))?);
            match tail {
                Some(t) => rest = t,
                None => {
                    rest = "";
                    break;
                }
            }
        } else {
            break;
        }
    }

    let section_text = if rest.is_empty() {
        SectionText::Full
    } else {
        let upper = rest.to_ascii_uppercase();
        if upper == "HEADER" {
            SectionText::Header
        } else if upper == "TEXT" {
            SectionText::Text
        } else if upper == "MIME" {
            SectionText::Mime
        } else if let Some(args) = upper.strip_prefix("HEADER.FIELDS.NOT") {
            SectionText::HeaderFieldsNot(parse_field_list(rest, args)?)
        } else if let Some(args) = upper.strip_prefix("HEADER.FIELDS") {
            SectionText::HeaderFields(parse_field_list(rest, args)?)
        } else {
            return Err(SectionError::Malformed(text.into()));
        }
    };

    Ok(Section { part: parts, text: section_text })
}

/// `original` and `after_keyword` are the same-length, case-preserving and
/// uppercased views of the text following the numeric part prefix (if
/// any); `after_keyword` is what's left of `original.to_ascii_uppercase()`
/// once the `HEADER.FIELDS[.NOT]` keyword itself has been stripped.
fn parse_field_list(original: &str, after_keyword: &str) -> Result<Vec<String>, SectionError> {
    let trimmed = after_keyword.trim_start();
    let offset = original.len() - trimmed.len();
    let group_src = original[offset..].as_bytes();
    let tokens = tokenize(group_src).map_err(SectionError::from)?;
    let group = tokens
        .first()
        .filter(|t| matches!(t, Token::Group(b) if b.first() == Some(&b'(')))
        .ok_or_else(|| SectionError::Malformed(original.to_string()))?;
    let names = tokenize_group_contents(group).map_err(SectionError::from)?;
    names
        .into_iter()
        .map(|t| t.as_str().map(|s| s.to_string()).ok_or_else(|| SectionError::Malformed(original.to_string())))
        .collect()
}

/// Parse a trailing `<start>` or `<start.length>` partial-range token.
pub fn parse_partial(token: &str) -> Result<Partial, SectionError> {
    let inner = token
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| SectionError::Malformed(token.into()))?;
    match inner.split_once('.') {
        Some((start, len)) => Ok(Partial {
            start: start.parse().map_err(|_| SectionError::Malformed(token.into()))?,
            length: Some(len.parse().map_err(|_| SectionError::Malformed(token.into()))?),
        }),
        None => Ok(Partial {
            start: inner.parse().map_err(|_| SectionError::Malformed(token.into()))?,
            length: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_is_the_whole_message() {
        assert_eq!(parse_section(b"").unwrap(), Section { part: vec![], text: SectionText::Full });
    }

    #[test]
    fn header_and_text_and_mime() {
        assert_eq!(parse_section(b"HEADER").unwrap().text, SectionText::Header);
        assert_eq!(parse_section(b"TEXT").unwrap().text, SectionText::Text);
        assert_eq!(parse_section(b"1.MIME").unwrap(), Section { part: vec![1], text: SectionText::Mime });
    }

    #[test]
    fn numeric_part_path() {
        assert_eq!(parse_section(b"1.2.3").unwrap(), Section { part: vec![1, 2, 3], text: SectionText::Full });
    }

    #[test]
    fn header_fields_list() {
        let s = parse_section(b"HEADER.FIELDS (SUBJECT TO)").unwrap();
        assert_eq!(s.text, SectionText::HeaderFields(vec!["SUBJECT".into(), "TO".into()]));
    }

    #[test]
    fn header_fields_not_list() {
        let s = parse_section(b"HEADER.FIELDS.NOT (RECEIVED)").unwrap();
        assert_eq!(s.text, SectionText::HeaderFieldsNot(vec!["RECEIVED".into()]));
    }

    #[test]
    fn partial_with_and_without_length() {
        assert_eq!(parse_partial("<0.1024>").unwrap(), Partial { start: 0, length: Some(1024) });
        assert_eq!(parse_partial("<512>").unwrap(), Partial { start: 512, length: None });
    }

    #[test]
    fn garbage_section_is_malformed() {
        assert!(parse_section(b"BOGUS").is_err());
    }
}
