use thiserror::Error;

/// Result of trying to decode one command line (and its literals) off the wire.
///
/// Mirrors the three-way split the teacher's own codec uses (`Incomplete` /
/// `LiteralFound` / `Failed`): a line reader needs to distinguish "give me
/// more bytes" from "this is a well-formed request for more input" from
/// "this can never be parsed".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes buffered yet; read more and retry.
    #[error("incomplete")]
    Incomplete,
    /// A `{N}` (non-synchronizing `{N+}` excluded) literal was found; the
    /// caller must send a continuation request before more bytes arrive.
    #[error("literal of {0} bytes requires a continuation request")]
    LiteralFound(u32),
    /// The literal announced a size over the configured maximum.
    #[error("literal of {0} bytes exceeds the maximum message size")]
    LiteralTooLarge(u32),
    /// The line could not be parsed as a command at all.
    #[error("malformed command line: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CharsetError {
    #[error("invalid modified UTF-7 sequence")]
    BadCharwidth,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("malformed sequence set: {0}")]
    Malformed(String),
}
