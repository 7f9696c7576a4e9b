//! IMAP flags (RFC 3501 §2.3.2) plus the `$Forwarded` keyword (spec.md §1, §4.F).

use std::fmt;

/// A single message flag, system or keyword.
///
/// Grounded on the teacher's `Flag` enum (system flags + `Keyword` +
/// `Extension` fallback), with `Forwarded` promoted to its own variant
/// because the gateway's flag-derivation rule (spec.md §4.F) treats it
/// specially rather than as an opaque keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    /// Session-local; never sent by a client in STORE/APPEND, only ever
    /// produced by the server.
    Recent,
    /// `$Forwarded`, tracked via `lastVerb == Forward` (spec.md §4.F).
    Forwarded,
    /// Server-defined keyword, e.g. `$Junk`.
    Keyword(String),
    /// `\*`, permanent-flags marker meaning "new keywords may be created".
    Permanent,
    /// Any other `\Xxx` system flag this server doesn't special-case.
    Extension(String),
}

impl Flag {
    /// Parse one flag token exactly as it appeared in a command (already
    /// split out by the tokenizer, still carrying its leading `\` if any).
    pub fn parse(token: &str) -> Flag {
        match token {
            "\\Seen" => Flag::Seen,
            "\\Answered" => Flag::Answered,
            "\\Flagged" => Flag::Flagged,
            "\\Deleted" => Flag::Deleted,
            "\\Draft" => Flag::Draft,
            "\\Recent" => Flag::Recent,
            "\\*" => Flag::Permanent,
            "$Forwarded" => Flag::Forwarded,
            other if other.starts_with('\\') => Flag::Extension(other[1..].to_string()),
            other => Flag::Keyword(other.to_string()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Forwarded => write!(f, "$Forwarded"),
            Flag::Permanent => write!(f, "\\*"),
            Flag::Keyword(kw) => write!(f, "{kw}"),
            Flag::Extension(name) => write!(f, "\\{name}"),
        }
    }
}

/// The full set of flags this server will ever report for a message
/// (spec.md scenario 2's `* FLAGS (...)` response).
pub const PERMANENT_FLAGS: &[Flag] = &[
    Flag::Seen,
    Flag::Draft,
    Flag::Deleted,
    Flag::Flagged,
    Flag::Answered,
    Flag::Forwarded,
];

/// Render a flag list the way `* <seq> FETCH (FLAGS (...))` and `* FLAGS
/// (...)` want it: space-joined, parenthesized.
pub fn flags_to_wire(flags: &[Flag]) -> String {
    let joined = flags
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("({joined})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_system_flags() {
        for (token, flag) in [
            ("\\Seen", Flag::Seen),
            ("\\Answered", Flag::Answered),
            ("\\Flagged", Flag::Flagged),
            ("\\Deleted", Flag::Deleted),
            ("\\Draft", Flag::Draft),
            ("$Forwarded", Flag::Forwarded),
        ] {
            assert_eq!(Flag::parse(token), flag);
            assert_eq!(flag.to_string(), token);
        }
    }

    #[test]
    fn keyword_roundtrip() {
        assert_eq!(Flag::parse("$Junk"), Flag::Keyword("$Junk".into()));
        assert_eq!(Flag::Keyword("$Junk".into()).to_string(), "$Junk");
    }

    #[test]
    fn wire_list_is_parenthesized() {
        assert_eq!(flags_to_wire(&[Flag::Seen, Flag::Flagged]), "(\\Seen \\Flagged)");
        assert_eq!(flags_to_wire(&[]), "()");
    }
}
