//! Component B: split one IMAP command line into words.
//!
//! Grounded on the teacher's `fragmentizer`/`tokio::server` style of doing
//! framing by hand-rolled byte scanning rather than a `nom` grammar — the
//! bracket/quote nesting this needs is naturally iterative state, not a
//! recursive-descent grammar.

use std::fmt;

/// One token of a tokenized command line.
///
/// `Group` covers both `(...)` and `[...]` forms: the brackets are kept,
/// the content is the raw, unprocessed bytes between them (callers that
/// need the words inside re-tokenize via [`tokenize`] after stripping the
/// outer bracket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare word or an unescaped quoted string's contents.
    Atom(Vec<u8>),
    /// A parenthesized or bracketed group, brackets included, raw.
    Group(Vec<u8>),
}

impl Token {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Token::Atom(b) => b,
            Token::Group(b) => b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    UnterminatedQuote,
    UnterminatedGroup,
    CrlfInQuote,
}

/// Split `line` (no trailing CRLF) into tokens.
///
/// `"quoted strings"` become a single [`Token::Atom`] with `\"` and `\\`
/// unescaped. `(parenthesized ...)` and `[bracketed ...]` groups become a
/// single [`Token::Group`], brackets included, with nesting of the same
/// bracket kind tracked so an inner `(...)`/`[...]` doesn't end the group
/// early. A bracket character that appears inside a quoted string (even
/// one nested inside a group) is literal, not structural.
pub fn tokenize(line: &[u8]) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut i = 0;
    let n = line.len();

    while i < n {
        match line[i] {
            b' ' | b'\t' => {
                i += 1;
            }
            b'"' => {
                let (atom, next) = scan_quoted(line, i)?;
                tokens.push(Token::Atom(atom));
                i = next;
            }
            b'(' => {
                let (group, next) = scan_group(line, i, b'(', b')')?;
                tokens.push(Token::Group(group));
                i = next;
            }
            b'[' => {
                let (group, next) = scan_group(line, i, b'[', b']')?;
                tokens.push(Token::Group(group));
                i = next;
            }
            _ => {
                let start = i;
                // A bracket butts up against a preceding atom with no
                // separating space (`BODY[HEADER]`, `FLAGS.SILENT (...)`
                // has a space but `BODY[...]` never does), so bareword
                // scanning has to stop there too, not just at whitespace.
                while i < n && !matches!(line[i], b' ' | b'\t' | b'(' | b'[') {
                    i += 1;
                }
                if i == start {
                    // A stray ')' or ']' with no opener; consume it as its
                    // own one-byte atom rather than looping forever.
                    i += 1;
                }
                tokens.push(Token::Atom(line[start..i].to_vec()));
            }
        }
    }

    Ok(tokens)
}

/// Strip a `Group`'s outer bracket and re-tokenize its contents, e.g. to
/// expand `(FLAGS (\Seen \Answered))` or `[HEADER.FIELDS (SUBJECT TO)]`.
pub fn tokenize_group_contents(group: &Token) -> Result<Vec<Token>, TokenizeError> {
    let bytes = group.as_bytes();
    if bytes.len() < 2 {
        return Ok(Vec::new());
    }
    tokenize(&bytes[1..bytes.len() - 1])
}

fn scan_quoted(line: &[u8], start: usize) -> Result<(Vec<u8>, usize), TokenizeError> {
    debug_assert_eq!(line[start], b'"');
    let mut out = Vec::new();
    let mut i = start + 1;
    let n = line.len();

    loop {
        if i >= n {
            return Err(TokenizeError::UnterminatedQuote);
        }
        match line[i] {
            b'\r' | b'\n' => return Err(TokenizeError::CrlfInQuote),
            b'"' => {
                return Ok((out, i + 1));
            }
            b'\\' => {
                i += 1;
                if i >= n {
                    return Err(TokenizeError::UnterminatedQuote);
                }
                match line[i] {
                    b'"' | b'\\' => {
                        out.push(line[i]);
                        i += 1;
                    }
                    other => {
                        // Not a defined escape; pass both bytes through.
                        out.push(b'\\');
                        out.push(other);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
}

fn scan_group(
    line: &[u8],
    start: usize,
    open: u8,
    close: u8,
) -> Result<(Vec<u8>, usize), TokenizeError> {
    debug_assert_eq!(line[start], open);
    let mut depth = 1usize;
    let mut i = start + 1;
    let n = line.len();
    let mut in_quote = false;

    while i < n {
        let b = line[i];
        if in_quote {
            match b {
                b'\r' | b'\n' => return Err(TokenizeError::CrlfInQuote),
                b'\\' => {
                    // Skip the escaped byte too, so `\"` and `\\` don't
                    // toggle quote state or get mistaken for brackets.
                    i += 2;
                    continue;
                }
                b'"' => in_quote = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => in_quote = true,
            x if x == open => depth += 1,
            x if x == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok((line[start..=i].to_vec(), i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }

    Err(TokenizeError::UnterminatedGroup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Token {
        Token::Atom(s.as_bytes().to_vec())
    }

    #[test]
    fn splits_plain_words() {
        let t = tokenize(b"a1 LOGIN alice secret").unwrap();
        assert_eq!(t, vec![atom("a1"), atom("LOGIN"), atom("alice"), atom("secret")]);
    }

    #[test]
    fn unescapes_quoted_string() {
        let t = tokenize(br#"a1 LOGIN "al\"ice" secret"#).unwrap();
        assert_eq!(t[2], Token::Atom(b"al\"ice".to_vec()));
    }

    #[test]
    fn keeps_group_raw_with_brackets() {
        let t = tokenize(b"a1 FETCH 1 (FLAGS (\\Seen \\Answered))").unwrap();
        assert_eq!(t[3], Token::Group(b"(FLAGS (\\Seen \\Answered))".to_vec()));
    }

    #[test]
    fn nested_parens_in_group_do_not_end_it_early() {
        let t = tokenize(b"(1 (2 3) 4)").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0], Token::Group(b"(1 (2 3) 4)".to_vec()));
    }

    #[test]
    fn closing_bracket_in_quote_is_literal() {
        let t = tokenize(br#"[HEADER.FIELDS ("A)B")]"#).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(
            t[0],
            Token::Group(br#"[HEADER.FIELDS ("A)B")]"#.to_vec())
        );
    }

    #[test]
    fn bracket_group_with_nested_parens() {
        let t = tokenize(b"BODY[HEADER.FIELDS (SUBJECT TO)]").unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0], atom("BODY"));
        assert_eq!(
            t[1],
            Token::Group(b"[HEADER.FIELDS (SUBJECT TO)]".to_vec())
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(tokenize(b"a1 LOGIN \"oops"), Err(TokenizeError::UnterminatedQuote));
    }

    #[test]
    fn unterminated_group_is_an_error() {
        assert_eq!(tokenize(b"a1 FETCH 1 (FLAGS"), Err(TokenizeError::UnterminatedGroup));
    }

    #[test]
    fn tokenize_group_contents_recurses() {
        let t = tokenize(b"(FLAGS (\\Seen \\Answered))").unwrap();
        let inner = tokenize_group_contents(&t[0]).unwrap();
        assert_eq!(inner, vec![atom("FLAGS"), Token::Group(b"(\\Seen \\Answered)".to_vec())]);
    }
}
