//! `STATUS` data items (spec.md §4.K's STATUS entry).

use crate::tokenizer::Token;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusItemError {
    #[error("unknown STATUS data item {0:?}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

pub fn parse_items(tokens: &[Token]) -> Result<Vec<StatusItem>, StatusItemError> {
    tokens
        .iter()
        .map(|t| {
            let name = t.as_str().unwrap_or_default().to_ascii_uppercase();
            match name.as_str() {
                "MESSAGES" => Ok(StatusItem::Messages),
                "RECENT" => Ok(StatusItem::Recent),
                "UIDNEXT" => Ok(StatusItem::UidNext),
                "UIDVALIDITY" => Ok(StatusItem::UidValidity),
                "UNSEEN" => Ok(StatusItem::Unseen),
                other => Err(StatusItemError::Unknown(other.to_string())),
            }
        })
        .collect()
}

impl std::fmt::Display for StatusItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusItem::Messages => "MESSAGES",
            StatusItem::Recent => "RECENT",
            StatusItem::UidNext => "UIDNEXT",
            StatusItem::UidValidity => "UIDVALIDITY",
            StatusItem::Unseen => "UNSEEN",
        };
        write!(f, "{s}")
    }
}

/// Render `STATUS` results the way `* STATUS mailbox (ITEM value ...)` wants.
pub fn render(mailbox: &str, values: &[(StatusItem, u32)]) -> String {
    let body = values
        .iter()
        .map(|(item, v)| format!("{item} {v}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{mailbox} ({body})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    #[test]
    fn parses_known_items() {
        let tokens = tokenize(b"MESSAGES UIDNEXT UNSEEN").unwrap();
        assert_eq!(
            parse_items(&tokens).unwrap(),
            vec![StatusItem::Messages, StatusItem::UidNext, StatusItem::Unseen]
        );
    }

    #[test]
    fn unknown_item_errors() {
        let tokens = tokenize(b"BOGUS").unwrap();
        assert!(parse_items(&tokens).is_err());
    }

    #[test]
    fn render_wire_format() {
        assert_eq!(
            render("INBOX", &[(StatusItem::Messages, 4), (StatusItem::UidNext, 12)]),
            "INBOX (MESSAGES 4 UIDNEXT 12)"
        );
    }
}
