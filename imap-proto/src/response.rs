//! Response framing: tagged, untagged and continuation wire types.
//!
//! Grounded on the teacher's `Response`/status-response split, flattened
//! here to plain formatting functions over `String` since this gateway's
//! session layer builds responses incrementally rather than constructing a
//! full response AST up front.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::No => write!(f, "NO"),
            Status::Bad => write!(f, "BAD"),
        }
    }
}

/// An optional `[CODE]` / `[CODE arg]` response code, e.g. `[ALERT]` or
/// `[UIDVALIDITY 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    Alert,
    Capability(Vec<String>),
    UidValidity(u32),
    UidNext(u32),
    Permanentflags(Vec<String>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    AppendUid(u32, u32),
    CopyUid(u32, String, String),
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Alert => write!(f, "ALERT"),
            Code::Capability(caps) => write!(f, "CAPABILITY {}", caps.join(" ")),
            Code::UidValidity(v) => write!(f, "UIDVALIDITY {v}"),
            Code::UidNext(v) => write!(f, "UIDNEXT {v}"),
            Code::Permanentflags(flags) => write!(f, "PERMANENTFLAGS ({})", flags.join(" ")),
            Code::ReadOnly => write!(f, "READ-ONLY"),
            Code::ReadWrite => write!(f, "READ-WRITE"),
            Code::TryCreate => write!(f, "TRYCREATE"),
            Code::AppendUid(validity, uid) => write!(f, "APPENDUID {validity} {uid}"),
            Code::CopyUid(validity, src, dst) => write!(f, "COPYUID {validity} {src} {dst}"),
        }
    }
}

/// `tag OK/NO/BAD [code] text\r\n`
pub fn tagged(tag: &str, status: Status, code: Option<Code>, text: &str) -> String {
    match code {
        Some(c) => format!("{tag} {status} [{c}] {text}\r\n"),
        None => format!("{tag} {status} {text}\r\n"),
    }
}

/// `* OK [code] text\r\n` — used for the greeting and unsolicited status updates.
pub fn untagged_status(status: Status, code: Option<Code>, text: &str) -> String {
    match code {
        Some(c) => format!("* {status} [{c}] {text}\r\n"),
        None => format!("* {status} {text}\r\n"),
    }
}

/// `* <line>\r\n` — a generic untagged data response (FLAGS, LIST, SEARCH,
/// FETCH, EXISTS, EXPUNGE, ...). `line` is the already-formatted payload
/// after the `* `.
pub fn untagged(line: &str) -> String {
    format!("* {line}\r\n")
}

/// `+ text\r\n` — a continuation request (literal ack, IDLE ack, AUTHENTICATE challenge).
pub fn continuation(text: &str) -> String {
    format!("+ {text}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_ok_with_no_code() {
        assert_eq!(tagged("a1", Status::Ok, None, "LOGIN completed"), "a1 OK LOGIN completed\r\n");
    }

    #[test]
    fn tagged_no_with_alert_code() {
        assert_eq!(
            tagged("a1", Status::No, Some(Code::Alert), "Maximum message size reached"),
            "a1 NO [ALERT] Maximum message size reached\r\n"
        );
    }

    #[test]
    fn untagged_exists_line() {
        assert_eq!(untagged("42 EXISTS"), "* 42 EXISTS\r\n");
    }

    #[test]
    fn continuation_ready_for_literal() {
        assert_eq!(continuation("Ready for literal data"), "+ Ready for literal data\r\n");
    }

    #[test]
    fn appenduid_code_renders() {
        assert_eq!(Code::AppendUid(1, 42).to_string(), "APPENDUID 1 42");
    }
}
