//! Component A: the literal-aware line framer.
//!
//! Grounded on the teacher's `tokio::server::ImapServerCodec`: framing lives
//! in a `tokio_util::codec::Decoder`, driven by a `Framed` transport, rather
//! than a hand-rolled read loop over a raw socket. The state machine itself
//! (`{N}` / `{N+}` literal detection, oversized-literal draining, multi-line
//! reassembly) follows spec.md §4.A.
//!
//! A literal's payload is opaque bytes — it must never be re-scanned by
//! [`tokenize`](crate::tokenizer::tokenize), since a message body can contain
//! any byte, including unbalanced brackets or quotes. So this codec tokenizes
//! line-by-line as each line arrives and only ever splices already-tokenized
//! literal content in as a finished [`Token::Atom`].

use crate::tokenizer::{tokenize, Token, TokenizeError};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// One fully reassembled command line, as a flat token stream (tag included
/// as the first token, same as what [`tokenize`] alone would produce for a
/// literal-free line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub tokens: Vec<Token>,
}

/// What the decoder wants the session loop to do before it can make progress.
#[derive(Debug)]
pub enum Frame {
    /// A complete command, ready to dispatch.
    Command(CommandLine),
    /// A `{N}` (not `{N+}`) literal was announced; write
    /// `"+ Ready for literal data\r\n"` before more bytes will arrive.
    ContinuationNeeded { size: u32 },
}

#[derive(Debug)]
pub enum FramerError {
    Tokenize(TokenizeError),
    /// The client announced a literal bigger than the configured limit. The
    /// offending bytes have already been drained from the stream; `tag` is
    /// the first token of the line, if one was parsed, for use in the
    /// `NO [ALERT]` response that aborts the command.
    LiteralTooLarge { tag: Option<Vec<u8>>, size: u32 },
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerError::Tokenize(e) => write!(f, "tokenize error: {e:?}"),
            FramerError::LiteralTooLarge { size, .. } => {
                write!(f, "literal of {size} bytes exceeds the maximum message size")
            }
        }
    }
}

impl std::error::Error for FramerError {}

impl From<TokenizeError> for FramerError {
    fn from(e: TokenizeError) -> Self {
        FramerError::Tokenize(e)
    }
}

/// Parse a trailing `{N}` / `{N+}` literal marker out of an atom token.
fn parse_literal_marker(token: &Token) -> Option<(u32, bool)> {
    let Token::Atom(bytes) = token else {
        return None;
    };
    let s = std::str::from_utf8(bytes).ok()?;
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    let (digits, sync) = match inner.strip_suffix('+') {
        Some(d) => (d, true),
        None => (inner, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size: u32 = digits.parse().ok()?;
    Some((size, sync))
}

#[derive(Debug)]
enum State {
    /// Waiting for a CRLF-terminated line. `acc` carries tokens from
    /// previous lines of a multi-literal command.
    Line { acc: Vec<Token> },
    /// Waiting for `needed` literal bytes to arrive in full.
    Literal { acc: Vec<Token>, needed: u32 },
    /// An oversized literal is being discarded; once `remaining` bytes have
    /// been thrown away the command is aborted.
    Draining { tag: Option<Vec<u8>>, remaining: u32, announced: u32 },
}

/// The command-line [`Decoder`]. One instance per connection.
pub struct GatewayCodec {
    max_literal: u32,
    state: State,
}

impl GatewayCodec {
    pub fn new(max_literal: u32) -> Self {
        GatewayCodec { max_literal, state: State::Line { acc: Vec::new() } }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    // A bare `\n` is accepted as a line terminator too, matching how real
    // IMAP clients occasionally misbehave and the teacher's own line reader
    // tolerates it.
    buf.iter().position(|&b| b == b'\n')
}

impl Decoder for GatewayCodec {
    type Item = Frame;
    type Error = FramerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FramerError> {
        loop {
            match &mut self.state {
                State::Draining { remaining, .. } => {
                    let available = src.len().min(*remaining as usize);
                    src.advance(available);
                    *remaining -= available as u32;
                    if *remaining > 0 {
                        return Ok(None);
                    }
                    let State::Draining { tag, announced, .. } =
                        std::mem::replace(&mut self.state, State::Line { acc: Vec::new() })
                    else {
                        unreachable!()
                    };
                    return Err(FramerError::LiteralTooLarge { tag, size: announced });
                }
                State::Literal { needed, .. } => {
                    if src.len() < *needed as usize {
                        return Ok(None);
                    }
                    let payload = src.split_to(*needed as usize).to_vec();
                    let State::Literal { mut acc, .. } =
                        std::mem::replace(&mut self.state, State::Line { acc: Vec::new() })
                    else {
                        unreachable!()
                    };
                    acc.push(Token::Atom(payload));
                    self.state = State::Line { acc };
                }
                State::Line { .. } => {
                    let Some(pos) = find_crlf(src) else {
                        return Ok(None);
                    };
                    let mut line_end = pos;
                    if line_end > 0 && src[line_end - 1] == b'\r' {
                        line_end -= 1;
                    }
                    let line = src[..line_end].to_vec();
                    src.advance(pos + 1);

                    let State::Line { mut acc } =
                        std::mem::replace(&mut self.state, State::Line { acc: Vec::new() })
                    else {
                        unreachable!()
                    };

                    let mut tokens = tokenize(&line)?;

                    let marker = tokens.last().and_then(parse_literal_marker);
                    if let Some((size, sync)) = marker {
                        tokens.pop();
                        acc.extend(tokens);

                        if size > self.max_literal {
                            tracing::debug!(size, max = self.max_literal, "draining oversized literal");
                            let tag = acc.first().map(|t| t.as_bytes().to_vec());
                            self.state = State::Draining { tag, remaining: size, announced: size };
                            if sync {
                                // The client already committed to sending the bytes
                                // without waiting for a "+"; nothing to prompt for.
                                continue;
                            }
                            // A classical {N} literal: the client is waiting for
                            // "+ Ready for literal data" before it sends anything.
                            // Without it the client blocks forever and we'd block
                            // forever draining bytes that never arrive.
                            return Ok(Some(Frame::ContinuationNeeded { size }));
                        }

                        if sync {
                            self.state = State::Literal { acc, needed: size };
                            continue;
                        } else {
                            self.state = State::Literal { acc, needed: size };
                            return Ok(Some(Frame::ContinuationNeeded { size }));
                        }
                    }

                    acc.extend(tokens);
                    return Ok(Some(Frame::Command(CommandLine { tokens: acc })));
                }
            }
        }
    }
}

/// Outbound response lines are already fully formatted, CRLF-terminated
/// wire text (built by [`crate::response`]'s functions), so encoding is
/// just a byte copy — there's no AST to serialize on the write side.
impl Encoder<String> for GatewayCodec {
    type Error = FramerError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), FramerError> {
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

impl Encoder<&str> for GatewayCodec {
    type Error = FramerError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), FramerError> {
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Token {
        Token::Atom(s.as_bytes().to_vec())
    }

    #[test]
    fn plain_command_with_no_literal() {
        let mut codec = GatewayCodec::new(1024);
        let mut buf = BytesMut::from(&b"a1 NOOP\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => assert_eq!(cmd.tokens, vec![atom("a1"), atom("NOOP")]),
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn non_synchronizing_literal_requests_continuation_then_splices() {
        let mut codec = GatewayCodec::new(1024);
        let mut buf = BytesMut::from(&b"a1 LOGIN {5}\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap();
        assert!(matches!(frame, Some(Frame::ContinuationNeeded { size: 5 })));

        // Not enough literal bytes yet.
        buf.extend_from_slice(b"alic");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"e secret\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => {
                assert_eq!(
                    cmd.tokens,
                    vec![atom("a1"), atom("LOGIN"), atom("alice"), atom("secret")]
                );
            }
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn literal_plus_needs_no_continuation() {
        let mut codec = GatewayCodec::new(1024);
        let mut buf = BytesMut::from(&b"a1 LOGIN {5+}\r\nalice secret\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => {
                assert_eq!(
                    cmd.tokens,
                    vec![atom("a1"), atom("LOGIN"), atom("alice"), atom("secret")]
                );
            }
            _ => panic!("expected immediate Command, not a continuation request"),
        }
    }

    #[test]
    fn literal_payload_is_opaque_even_with_unbalanced_brackets() {
        let mut codec = GatewayCodec::new(1024);
        let mut buf = BytesMut::from(&b"a1 APPEND INBOX {8+}\r\n(unbal\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => {
                assert_eq!(cmd.tokens[3], Token::Atom(b"(unbal\r\n".to_vec()));
            }
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn oversized_synchronizing_literal_prompts_continuation_before_draining() {
        let mut codec = GatewayCodec::new(4);
        let mut buf = BytesMut::from(&b"a1 APPEND INBOX {10}\r\n"[..]);
        // A classical {N} literal: the client won't send the bytes until it
        // sees "+", so the decoder must ask for them instead of silently
        // waiting to drain bytes that will never arrive.
        let frame = codec.decode(&mut buf).unwrap();
        assert!(matches!(frame, Some(Frame::ContinuationNeeded { size: 10 })));

        buf.extend_from_slice(b"0123456789");
        let err = codec.decode(&mut buf).unwrap_err();
        match err {
            FramerError::LiteralTooLarge { tag, size } => {
                assert_eq!(tag, Some(b"a1".to_vec()));
                assert_eq!(size, 10);
            }
            _ => panic!("expected LiteralTooLarge"),
        }
        // Stream resynchronizes: a following command still decodes cleanly.
        buf.extend_from_slice(b"a2 NOOP\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => assert_eq!(cmd.tokens, vec![atom("a2"), atom("NOOP")]),
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn oversized_nonsynchronizing_literal_drains_without_continuation() {
        let mut codec = GatewayCodec::new(4);
        let mut buf = BytesMut::from(&b"a1 APPEND INBOX {10+}\r\n"[..]);
        // The client already committed to sending the bytes; no "+" prompt.
        let result = codec.decode(&mut buf);
        assert!(matches!(result, Ok(None)));
        buf.extend_from_slice(b"0123456789");
        let err = codec.decode(&mut buf).unwrap_err();
        match err {
            FramerError::LiteralTooLarge { tag, size } => {
                assert_eq!(tag, Some(b"a1".to_vec()));
                assert_eq!(size, 10);
            }
            _ => panic!("expected LiteralTooLarge"),
        }
    }

    #[test]
    fn multiple_literals_across_lines_reassemble_into_one_command() {
        let mut codec = GatewayCodec::new(1024);
        let mut buf = BytesMut::from(&b"a1 LOGIN {5+}\r\nalice {6+}\r\nsecret\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        match frame {
            Frame::Command(cmd) => {
                assert_eq!(
                    cmd.tokens,
                    vec![atom("a1"), atom("LOGIN"), atom("alice"), atom("secret")]
                );
            }
            _ => panic!("expected Command"),
        }
    }
}
