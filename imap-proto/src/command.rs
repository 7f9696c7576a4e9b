//! Command parsing: turn a [`CommandLine`]'s tokens into a typed [`Command`].
//!
//! Covers the command table this gateway implements (spec.md §4.K): the
//! RFC 3501 core plus IDLE, NAMESPACE, UIDPLUS's `UID EXPUNGE`, and the
//! `XAOL-MOVE` extension. Commands outside that table (CONDSTORE, QRESYNC,
//! METADATA, COMPRESS, SORT, THREAD, BINARY, ID, ENABLE, UTF8) are
//! deliberately not modeled here; they fall through to `Command::Unknown`.

use crate::flag::Flag;
use crate::framer::CommandLine;
use crate::mutf7;
use crate::sequence::SequenceSet;
use crate::tokenizer::{tokenize_group_contents, Token};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing tag")]
    MissingTag,
    #[error("missing command name")]
    MissingName,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("wrong number of arguments for {0}")]
    Arity(&'static str),
    #[error("malformed argument for {0}: {1}")]
    BadArgument(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox(pub String);

impl Mailbox {
    pub fn from_wire(token: &Token) -> Result<Mailbox, CommandError> {
        let wire = token
            .as_str()
            .ok_or_else(|| CommandError::BadArgument("mailbox", "not UTF-8".into()))?;
        let native = mutf7::decode(wire)
            .map_err(|_| CommandError::BadArgument("mailbox", "invalid folder name".into()))?;
        Ok(Mailbox(normalize_inbox(native)))
    }
}

fn normalize_inbox(name: String) -> String {
    if name.eq_ignore_ascii_case("inbox") {
        "INBOX".to_string()
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Replace,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreArgs {
    pub sequence: SequenceSet,
    pub uid: bool,
    pub op: StoreOp,
    pub silent: bool,
    pub flags: Vec<Flag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    pub sequence: SequenceSet,
    pub uid: bool,
    /// Raw, not-yet-parsed data item tokens; [`crate::fetch`] interprets
    /// these against the section grammar.
    pub items: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capability,
    Noop,
    Logout,
    StartTls,
    Login { user: String, pass: String },
    Authenticate { mechanism: String },
    Select { mailbox: Mailbox },
    Examine { mailbox: Mailbox },
    Create { mailbox: Mailbox },
    Delete { mailbox: Mailbox },
    Rename { from: Mailbox, to: Mailbox },
    Subscribe { mailbox: Mailbox },
    Unsubscribe { mailbox: Mailbox },
    List { reference: Mailbox, pattern: String },
    Lsub { reference: Mailbox, pattern: String },
    Status { mailbox: Mailbox, items: Vec<Token> },
    Append { mailbox: Mailbox, flags: Vec<Flag>, date: Option<String>, message: Vec<u8> },
    Check,
    Close,
    Expunge { uid: bool },
    Search { uid: bool, criteria: Vec<Token> },
    Fetch(FetchArgs),
    Store(StoreArgs),
    Copy { sequence: SequenceSet, uid: bool, mailbox: Mailbox },
    Move { sequence: SequenceSet, uid: bool, mailbox: Mailbox },
    Idle,
    Done,
    Namespace,
    GetQuotaRoot { mailbox: Mailbox },
    GetQuota { quota_root: String },
    SetQuota { quota_root: String },
    Unknown { name: String },
}

/// A parsed command line, still carrying its tag for response framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedCommand {
    pub tag: String,
    pub command: Command,
}

pub fn parse(line: CommandLine) -> Result<TaggedCommand, CommandError> {
    let mut tokens = line.tokens.into_iter();
    let tag = tokens.next().ok_or(CommandError::MissingTag)?;
    let tag = tag.as_str().ok_or(CommandError::MissingTag)?.to_string();
    let name_tok = tokens.next().ok_or(CommandError::MissingName)?;
    let mut name = name_tok
        .as_str()
        .ok_or(CommandError::MissingName)?
        .to_ascii_uppercase();

    let uid_prefixed = name == "UID";
    if uid_prefixed {
        let sub = tokens.next().ok_or(CommandError::MissingName)?;
        name = sub
            .as_str()
            .ok_or(CommandError::MissingName)?
            .to_ascii_uppercase();
    }

    let rest: Vec<Token> = tokens.collect();
    let command = parse_body(&name, uid_prefixed, rest)?;
    Ok(TaggedCommand { tag, command })
}

fn atom_str(tok: &Token, cmd: &'static str) -> Result<String, CommandError> {
    tok.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CommandError::BadArgument(cmd, "not UTF-8".into()))
}

fn parse_sequence(tok: &Token, cmd: &'static str) -> Result<SequenceSet, CommandError> {
    let s = atom_str(tok, cmd)?;
    SequenceSet::parse(&s).map_err(|e| CommandError::BadArgument(cmd, e.to_string()))
}

fn parse_flag_group(tok: &Token, cmd: &'static str) -> Result<Vec<Flag>, CommandError> {
    let inner = tokenize_group_contents(tok)
        .map_err(|_| CommandError::BadArgument(cmd, "malformed flag list".into()))?;
    let mut flags = Vec::with_capacity(inner.len());
    for t in inner {
        let s = atom_str(&t, cmd)?;
        flags.push(Flag::parse(&s));
    }
    Ok(flags)
}

fn parse_body(name: &str, uid: bool, args: Vec<Token>) -> Result<Command, CommandError> {
    match name {
        "CAPABILITY" => Ok(Command::Capability),
        "NOOP" => Ok(Command::Noop),
        "LOGOUT" => Ok(Command::Logout),
        "STARTTLS" => Ok(Command::StartTls),
        "IDLE" => Ok(Command::Idle),
        "DONE" => Ok(Command::Done),
        "NAMESPACE" => Ok(Command::Namespace),
        "CHECK" => Ok(Command::Check),
        "CLOSE" => Ok(Command::Close),
        "EXPUNGE" => Ok(Command::Expunge { uid }),

        "LOGIN" => {
            let [user, pass] = take2(args, "LOGIN")?;
            Ok(Command::Login { user: atom_str(&user, "LOGIN")?, pass: atom_str(&pass, "LOGIN")? })
        }
        "AUTHENTICATE" => {
            let [mech] = take1(args, "AUTHENTICATE")?;
            Ok(Command::Authenticate { mechanism: atom_str(&mech, "AUTHENTICATE")?.to_ascii_uppercase() })
        }
        "SELECT" => {
            let [m] = take1(args, "SELECT")?;
            Ok(Command::Select { mailbox: Mailbox::from_wire(&m)? })
        }
        "EXAMINE" => {
            let [m] = take1(args, "EXAMINE")?;
            Ok(Command::Examine { mailbox: Mailbox::from_wire(&m)? })
        }
        "CREATE" => {
            let [m] = take1(args, "CREATE")?;
            Ok(Command::Create { mailbox: Mailbox::from_wire(&m)? })
        }
        "DELETE" => {
            let [m] = take1(args, "DELETE")?;
            Ok(Command::Delete { mailbox: Mailbox::from_wire(&m)? })
        }
        "RENAME" => {
            let [from, to] = take2(args, "RENAME")?;
            Ok(Command::Rename { from: Mailbox::from_wire(&from)?, to: Mailbox::from_wire(&to)? })
        }
        "SUBSCRIBE" => {
            let [m] = take1(args, "SUBSCRIBE")?;
            Ok(Command::Subscribe { mailbox: Mailbox::from_wire(&m)? })
        }
        "UNSUBSCRIBE" => {
            let [m] = take1(args, "UNSUBSCRIBE")?;
            Ok(Command::Unsubscribe { mailbox: Mailbox::from_wire(&m)? })
        }
        "LIST" => {
            let [r, p] = take2(args, "LIST")?;
            Ok(Command::List { reference: Mailbox::from_wire(&r)?, pattern: atom_str(&p, "LIST")? })
        }
        "LSUB" => {
            let [r, p] = take2(args, "LSUB")?;
            Ok(Command::Lsub { reference: Mailbox::from_wire(&r)?, pattern: atom_str(&p, "LSUB")? })
        }
        "STATUS" => {
            let mut it = args.into_iter();
            let m = it.next().ok_or(CommandError::Arity("STATUS"))?;
            let items_group = it.next().ok_or(CommandError::Arity("STATUS"))?;
            let items = tokenize_group_contents(&items_group)
                .map_err(|_| CommandError::BadArgument("STATUS", "malformed item list".into()))?;
            Ok(Command::Status { mailbox: Mailbox::from_wire(&m)?, items })
        }
        "APPEND" => parse_append(args),
        "SEARCH" => Ok(Command::Search { uid, criteria: args }),
        "FETCH" => {
            let mut it = args.into_iter();
            let seq = it.next().ok_or(CommandError::Arity("FETCH"))?;
            let items_tok = it.next().ok_or(CommandError::Arity("FETCH"))?;
            let items = match &items_tok {
                Token::Group(_) => tokenize_group_contents(&items_tok)
                    .map_err(|_| CommandError::BadArgument("FETCH", "malformed item list".into()))?,
                Token::Atom(_) => vec![items_tok],
            };
            Ok(Command::Fetch(FetchArgs { sequence: parse_sequence(&seq, "FETCH")?, uid, items }))
        }
        "STORE" => {
            let mut it = args.into_iter();
            let seq = it.next().ok_or(CommandError::Arity("STORE"))?;
            let op_tok = it.next().ok_or(CommandError::Arity("STORE"))?;
            let flags_tok = it.next().ok_or(CommandError::Arity("STORE"))?;
            let op_str = atom_str(&op_tok, "STORE")?.to_ascii_uppercase();
            let (op, silent) = match op_str.as_str() {
                "FLAGS" => (StoreOp::Replace, false),
                "FLAGS.SILENT" => (StoreOp::Replace, true),
                "+FLAGS" => (StoreOp::Add, false),
                "+FLAGS.SILENT" => (StoreOp::Add, true),
                "-FLAGS" => (StoreOp::Remove, false),
                "-FLAGS.SILENT" => (StoreOp::Remove, true),
                other => return Err(CommandError::BadArgument("STORE", other.to_string())),
            };
            let flags = match &flags_tok {
                Token::Group(_) => parse_flag_group(&flags_tok, "STORE")?,
                Token::Atom(_) => vec![Flag::parse(&atom_str(&flags_tok, "STORE")?)],
            };
            Ok(Command::Store(StoreArgs { sequence: parse_sequence(&seq, "STORE")?, uid, op, silent, flags }))
        }
        "COPY" => {
            let [seq, m] = take2(args, "COPY")?;
            Ok(Command::Copy { sequence: parse_sequence(&seq, "COPY")?, uid, mailbox: Mailbox::from_wire(&m)? })
        }
        "XAOL-MOVE" => {
            let [seq, m] = take2(args, "XAOL-MOVE")?;
            Ok(Command::Move { sequence: parse_sequence(&seq, "XAOL-MOVE")?, uid, mailbox: Mailbox::from_wire(&m)? })
        }
        "GETQUOTAROOT" => {
            let [m] = take1(args, "GETQUOTAROOT")?;
            Ok(Command::GetQuotaRoot { mailbox: Mailbox::from_wire(&m)? })
        }
        "GETQUOTA" => {
            let [q] = take1(args, "GETQUOTA")?;
            Ok(Command::GetQuota { quota_root: atom_str(&q, "GETQUOTA")? })
        }
        "SETQUOTA" => {
            // The resource-limit list is never honored (spec.md: always NO
            // Permission denied), so its contents don't need parsing.
            let [q, _limits] = take2(args, "SETQUOTA")?;
            Ok(Command::SetQuota { quota_root: atom_str(&q, "SETQUOTA")? })
        }
        other => Ok(Command::Unknown { name: other.to_string() }),
    }
}

fn parse_append(args: Vec<Token>) -> Result<Command, CommandError> {
    let mut it = args.into_iter().peekable();
    let mailbox_tok = it.next().ok_or(CommandError::Arity("APPEND"))?;
    let mailbox = Mailbox::from_wire(&mailbox_tok)?;

    let mut flags = Vec::new();
    if matches!(it.peek(), Some(Token::Group(_))) {
        flags = parse_flag_group(&it.next().unwrap(), "APPEND")?;
    }

    let mut date = None;
    if let Some(Token::Atom(_)) = it.peek() {
        date = Some(atom_str(&it.next().unwrap(), "APPEND")?);
    }

    let message_tok = it.next().ok_or(CommandError::Arity("APPEND"))?;
    let message = message_tok.as_bytes().to_vec();

    Ok(Command::Append { mailbox, flags, date, message })
}

fn take1(args: Vec<Token>, cmd: &'static str) -> Result<[Token; 1], CommandError> {
    let mut it = args.into_iter();
    let a = it.next().ok_or(CommandError::Arity(cmd))?;
    if it.next().is_some() {
        return Err(CommandError::Arity(cmd));
    }
    Ok([a])
}

fn take2(args: Vec<Token>, cmd: &'static str) -> Result<[Token; 2], CommandError> {
    let mut it = args.into_iter();
    let a = it.next().ok_or(CommandError::Arity(cmd))?;
    let b = it.next().ok_or(CommandError::Arity(cmd))?;
    if it.next().is_some() {
        return Err(CommandError::Arity(cmd));
    }
    Ok([a, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse_line(s: &str) -> TaggedCommand {
        let tokens = tokenize(s.as_bytes()).unwrap();
        parse(CommandLine { tokens }).unwrap()
    }

    #[test]
    fn login_parses_user_and_pass() {
        let cmd = parse_line("a1 LOGIN alice secret");
        assert_eq!(cmd.tag, "a1");
        assert_eq!(cmd.command, Command::Login { user: "alice".into(), pass: "secret".into() });
    }

    #[test]
    fn select_decodes_mutf7_mailbox_and_normalizes_inbox() {
        let cmd = parse_line("a1 SELECT inbox");
        assert_eq!(cmd.command, Command::Select { mailbox: Mailbox("INBOX".into()) });
    }

    #[test]
    fn uid_prefixed_fetch_sets_uid_flag() {
        let cmd = parse_line("a1 UID FETCH 1:* (FLAGS)");
        match cmd.command {
            Command::Fetch(f) => {
                assert!(f.uid);
                assert_eq!(f.items.len(), 1);
            }
            _ => panic!("expected Fetch"),
        }
    }

    #[test]
    fn store_plus_flags_silent() {
        let cmd = parse_line(r"a1 STORE 1:3 +FLAGS.SILENT (\Seen)");
        match cmd.command {
            Command::Store(s) => {
                assert_eq!(s.op, StoreOp::Add);
                assert!(s.silent);
                assert_eq!(s.flags, vec![Flag::Seen]);
            }
            _ => panic!("expected Store"),
        }
    }

    #[test]
    fn append_with_flags_and_date_and_literal_body() {
        let tokens = tokenize(br#"a1 APPEND INBOX (\Seen) "01-Jan-2024 00:00:00 +0000" {5+}"#).unwrap();
        let mut tokens = tokens;
        tokens.push(Token::Atom(b"hello".to_vec()));
        let cmd = parse(CommandLine { tokens }).unwrap();
        match cmd.command {
            Command::Append { mailbox, flags, date, message } => {
                assert_eq!(mailbox, Mailbox("INBOX".into()));
                assert_eq!(flags, vec![Flag::Seen]);
                assert!(date.is_some());
                assert_eq!(message, b"hello".to_vec());
            }
            _ => panic!("expected Append"),
        }
    }

    #[test]
    fn quota_commands_parse() {
        let cmd = parse_line("a1 GETQUOTAROOT INBOX");
        assert_eq!(cmd.command, Command::GetQuotaRoot { mailbox: Mailbox("INBOX".into()) });

        let cmd = parse_line(r#"a1 GETQUOTA """#);
        assert_eq!(cmd.command, Command::GetQuota { quota_root: String::new() });

        let cmd = parse_line(r#"a1 SETQUOTA "" (STORAGE 512000)"#);
        assert_eq!(cmd.command, Command::SetQuota { quota_root: String::new() });
    }

    #[test]
    fn unknown_command_is_not_an_error() {
        let cmd = parse_line("a1 COMPRESS DEFLATE");
        assert_eq!(cmd.command, Command::Unknown { name: "COMPRESS".into() });
    }

    #[test]
    fn missing_arguments_report_arity_error() {
        let tokens = tokenize(b"a1 LOGIN alice").unwrap();
        let err = parse(CommandLine { tokens }).unwrap_err();
        assert_eq!(err, CommandError::Arity("LOGIN"));
    }
}
