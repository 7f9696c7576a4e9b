//! `SEARCH`/`UID SEARCH` criteria grammar (spec.md §4.G).
//!
//! Parses the already-tokenized criteria list into a [`SearchKey`] tree.
//! Compiling that tree into store restrictions plus any locally-evaluated
//! leftover predicates is the gateway's job (it needs mailbox state this
//! crate doesn't have); this module only builds the AST.

use crate::flag::Flag;
use crate::sequence::SequenceSet;
use crate::tokenizer::{tokenize_group_contents, Token};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("unknown search key {0:?}")]
    Unknown(String),
    #[error("malformed search key {0:?}: {1}")]
    Malformed(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    All,
    Answered,
    Unanswered,
    Deleted,
    Undeleted,
    Draft,
    Undraft,
    Flagged,
    Unflagged,
    Seen,
    Unseen,
    New,
    Old,
    Recent,
    Keyword(String),
    Unkeyword(String),
    Bcc(String),
    Cc(String),
    From(String),
    Subject(String),
    To(String),
    Text(String),
    Body(String),
    Header(String, String),
    Before(String),
    On(String),
    Since(String),
    SentBefore(String),
    SentOn(String),
    SentSince(String),
    Larger(u32),
    Smaller(u32),
    Uid(SequenceSet),
    SequenceSet(SequenceSet),
    Not(Box<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    And(Vec<SearchKey>),
}

pub fn parse(tokens: &[Token]) -> Result<SearchKey, SearchError> {
    let keys = parse_sequence_of_keys(tokens)?;
    Ok(match keys.len() {
        0 => SearchKey::All,
        1 => keys.into_iter().next().unwrap(),
        _ => SearchKey::And(keys),
    })
}

fn parse_sequence_of_keys(tokens: &[Token]) -> Result<Vec<SearchKey>, SearchError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (key, consumed) = parse_one(tokens, i)?;
        out.push(key);
        i += consumed;
    }
    Ok(out)
}

fn word(tok: &Token) -> Result<String, SearchError> {
    tok.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| SearchError::Malformed("<token>".into(), "not UTF-8".into()))
}

fn arg(tokens: &[Token], i: usize, key: &'static str) -> Result<String, SearchError> {
    tokens
        .get(i)
        .ok_or_else(|| SearchError::Malformed(key.into(), "missing argument".into()))
        .and_then(word)
}

/// Parse one key (which may itself consume several following tokens, e.g.
/// `OR key1 key2`, `NOT key`, or a parenthesized group) starting at `i`.
/// Returns the key and how many tokens it consumed.
fn parse_one(tokens: &[Token], i: usize) -> Result<(SearchKey, usize), SearchError> {
    let tok = &tokens[i];

    if let Token::Group(_) = tok {
        let inner = tokenize_group_contents(tok)
            .map_err(|e| SearchError::Malformed("(...)".into(), format!("{e:?}")))?;
        let keys = parse_sequence_of_keys(&inner)?;
        let key = match keys.len() {
            0 => SearchKey::All,
            1 => keys.into_iter().next().unwrap(),
            _ => SearchKey::And(keys),
        };
        return Ok((key, 1));
    }

    let raw = word(tok)?;
    let upper = raw.to_ascii_uppercase();

    macro_rules! leaf {
        ($variant:expr) => {
            Ok(($variant, 1))
        };
    }
    macro_rules! with_str_arg {
        ($variant:path) => {{
            let a = arg(tokens, i + 1, "arg")?;
            Ok(($variant(a), 2))
        }};
    }
    macro_rules! with_num_arg {
        ($variant:path) => {{
            let a = arg(tokens, i + 1, "arg")?;
            let n: u32 = a
                .parse()
                .map_err(|_| SearchError::Malformed(upper.clone(), "expected a number".into()))?;
            Ok(($variant(n), 2))
        }};
    }

    match upper.as_str() {
        "ALL" => leaf!(SearchKey::All),
        "ANSWERED" => leaf!(SearchKey::Answered),
        "UNANSWERED" => leaf!(SearchKey::Unanswered),
        "DELETED" => leaf!(SearchKey::Deleted),
        "UNDELETED" => leaf!(SearchKey::Undeleted),
        "DRAFT" => leaf!(SearchKey::Draft),
        "UNDRAFT" => leaf!(SearchKey::Undraft),
        "FLAGGED" => leaf!(SearchKey::Flagged),
        "UNFLAGGED" => leaf!(SearchKey::Unflagged),
        "SEEN" => leaf!(SearchKey::Seen),
        "UNSEEN" => leaf!(SearchKey::Unseen),
        "NEW" => leaf!(SearchKey::New),
        "OLD" => leaf!(SearchKey::Old),
        "RECENT" => leaf!(SearchKey::Recent),
        "KEYWORD" => {
            let a = arg(tokens, i + 1, "KEYWORD")?;
            Ok((SearchKey::Keyword(Flag::parse(&a).to_string()), 2))
        }
        "UNKEYWORD" => {
            let a = arg(tokens, i + 1, "UNKEYWORD")?;
            Ok((SearchKey::Unkeyword(Flag::parse(&a).to_string()), 2))
        }
        "BCC" => with_str_arg!(SearchKey::Bcc),
        "CC" => with_str_arg!(SearchKey::Cc),
        "FROM" => with_str_arg!(SearchKey::From),
        "SUBJECT" => with_str_arg!(SearchKey::Subject),
        "TO" => with_str_arg!(SearchKey::To),
        "TEXT" => with_str_arg!(SearchKey::Text),
        "BODY" => with_str_arg!(SearchKey::Body),
        "BEFORE" => with_str_arg!(SearchKey::Before),
        "ON" => with_str_arg!(SearchKey::On),
        "SINCE" => with_str_arg!(SearchKey::Since),
        "SENTBEFORE" => with_str_arg!(SearchKey::SentBefore),
        "SENTON" => with_str_arg!(SearchKey::SentOn),
        "SENTSINCE" => with_str_arg!(SearchKey::SentSince),
        "LARGER" => with_num_arg!(SearchKey::Larger),
        "SMALLER" => with_num_arg!(SearchKey::Smaller),
        "HEADER" => {
            let field = arg(tokens, i + 1, "HEADER")?;
            let value = arg(tokens, i + 2, "HEADER")?;
            Ok((SearchKey::Header(field, value), 3))
        }
        "UID" => {
            let a = arg(tokens, i + 1, "UID")?;
            let set = SequenceSet::parse(&a)
                .map_err(|e| SearchError::Malformed("UID".into(), e.to_string()))?;
            Ok((SearchKey::Uid(set), 2))
        }
        "NOT" => {
            let (inner, consumed) = parse_one(tokens, i + 1)?;
            Ok((SearchKey::Not(Box::new(inner)), 1 + consumed))
        }
        "OR" => {
            let (left, consumed_l) = parse_one(tokens, i + 1)?;
            let (right, consumed_r) = parse_one(tokens, i + 1 + consumed_l)?;
            Ok((SearchKey::Or(Box::new(left), Box::new(right)), 1 + consumed_l + consumed_r))
        }
        other if other.chars().next().map(|c| c.is_ascii_digit() || c == '*').unwrap_or(false) => {
            let set = SequenceSet::parse(other)
                .map_err(|e| SearchError::Malformed(other.into(), e.to_string()))?;
            Ok((SearchKey::SequenceSet(set), 1))
        }
        other => Err(SearchError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse_str(s: &str) -> SearchKey {
        let tokens = tokenize(s.as_bytes()).unwrap();
        parse(&tokens).unwrap()
    }

    #[test]
    fn implicit_and_of_bare_keys() {
        assert_eq!(parse_str("UNSEEN FLAGGED"), SearchKey::And(vec![SearchKey::Unseen, SearchKey::Flagged]));
    }

    #[test]
    fn string_argument_key() {
        assert_eq!(parse_str("SUBJECT hello"), SearchKey::Subject("hello".into()));
    }

    #[test]
    fn or_takes_exactly_two_keys() {
        assert_eq!(
            parse_str("OR SEEN DELETED"),
            SearchKey::Or(Box::new(SearchKey::Seen), Box::new(SearchKey::Deleted))
        );
    }

    #[test]
    fn not_wraps_a_single_key() {
        assert_eq!(parse_str("NOT SEEN"), SearchKey::Not(Box::new(SearchKey::Seen)));
    }

    #[test]
    fn parenthesized_group_is_its_own_and() {
        assert_eq!(
            parse_str("(SEEN FLAGGED)"),
            SearchKey::And(vec![SearchKey::Seen, SearchKey::Flagged])
        );
    }

    #[test]
    fn bare_sequence_set_is_a_key() {
        assert_eq!(parse_str("1:3"), SearchKey::SequenceSet(SequenceSet::parse("1:3").unwrap()));
    }

    #[test]
    fn header_takes_two_arguments() {
        assert_eq!(
            parse_str("HEADER X-Spam yes"),
            SearchKey::Header("X-Spam".into(), "yes".into())
        );
    }

    #[test]
    fn empty_criteria_is_all() {
        assert_eq!(parse(&[]).unwrap(), SearchKey::All);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let tokens = tokenize(b"BOGUSKEY").unwrap();
        assert!(parse(&tokens).is_err());
    }
}
