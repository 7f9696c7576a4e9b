//! Component K: the command dispatcher & state machine (spec.md §4.K).
//!
//! Owns one connection's protocol state and turns a parsed [`Command`]
//! into response lines by calling into the other gateway modules. Actual
//! socket I/O, TLS upgrade and the IDLE wait loop live in
//! [`crate::listener`]; this module only decides *what* to send, never
//! writes to a socket itself, so it can be driven identically by the POP3
//! tests or a future non-TCP transport.

use std::sync::Arc;

use imap_proto::command::{Command, StoreOp};
use imap_proto::fetch::parse_items;
use imap_proto::flag::PERMANENT_FLAGS;
use imap_proto::response::{untagged, untagged_status, Code, Status};
use imap_proto::search::SearchKey;
use store::{Folder, Store};

use crate::auth::{AuthPolicy, LOGIN_RETRIES};
use crate::config::Config;
use crate::error::GatewayError;
use crate::mailbox_view::MailboxView;
use crate::{fetch, mutate, search};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unauth,
    Auth,
    Selected,
    Idle,
    Logout,
}

/// What the dispatcher wants the listener to do after a command.
pub enum Outcome {
    /// Keep reading commands; send these lines first.
    Continue(Vec<String>),
    /// Send these lines, then negotiate TLS on the same socket in place.
    StartTls(Vec<String>),
    /// Send these lines (including the `+` continuation), then hand
    /// control to [`crate::idle`] until the client sends `DONE`.
    EnterIdle(Vec<String>),
    /// Send these lines, then close the connection.
    Close(Vec<String>),
}

pub struct Session {
    pub state: State,
    config: Arc<Config>,
    auth: Arc<AuthPolicy>,
    store: Option<Arc<dyn Store>>,
    folder: Option<Box<dyn Folder>>,
    view: Option<MailboxView>,
    failed_logins: u32,
    fail_count: u32,
    pub peer: String,
    pub is_encrypted: bool,
    pub is_local: bool,
}

impl Session {
    pub fn new(config: Arc<Config>, auth: Arc<AuthPolicy>, peer: String, is_encrypted: bool, is_local: bool) -> Self {
        Session {
            state: State::Unauth,
            config,
            auth,
            store: None,
            folder: None,
            view: None,
            failed_logins: 0,
            fail_count: 0,
            peer,
            is_encrypted,
            is_local,
        }
    }

    fn capabilities(&self) -> Vec<String> {
        let mut caps = vec!["IMAP4rev1".to_string(), "LITERAL+".to_string()];
        match self.state {
            State::Unauth => {
                if self.config.tls_enabled() && !self.is_encrypted {
                    caps.push("STARTTLS".to_string());
                }
                if self.config.disable_plaintext_auth && !self.is_encrypted && !self.is_local {
                    caps.push("LOGINDISABLED".to_string());
                } else {
                    caps.push("AUTH=PLAIN".to_string());
                }
            }
            _ => {
                caps.extend(["CHILDREN".to_string(), "XAOL-OPTION".to_string(), "NAMESPACE".to_string(), "QUOTA".to_string()]);
                if self.config.imap_capability_idle {
                    caps.push("IDLE".to_string());
                }
            }
        }
        caps
    }

    /// `* OK [<CAPABILITY>] ...\r\n` sent right after accept.
    pub fn greeting(&self) -> String {
        let text = self
            .config
            .server_hostname_greeting
            .clone()
            .unwrap_or_else(|| "IMAP gateway ready".to_string());
        untagged_status(Status::Ok, Some(Code::Capability(self.capabilities())), &text)
    }

    fn require_state(&self, minimum: State) -> Result<(), GatewayError> {
        let ok = match minimum {
            State::Unauth => true,
            State::Auth => matches!(self.state, State::Auth | State::Selected | State::Idle),
            State::Selected | State::Idle => matches!(self.state, State::Selected | State::Idle),
            State::Logout => true,
        };
        if ok {
            Ok(())
        } else {
            Err(GatewayError::CallFailed("command not permitted in this state".into()))
        }
    }

    fn folder(&self) -> Result<&dyn Folder, GatewayError> {
        self.folder.as_deref().ok_or(GatewayError::CallFailed("no mailbox selected".into()))
    }

    fn view(&self) -> Result<&MailboxView, GatewayError> {
        self.view.as_ref().ok_or(GatewayError::CallFailed("no mailbox selected".into()))
    }

    fn store(&self) -> Result<&Arc<dyn Store>, GatewayError> {
        self.store.as_ref().ok_or(GatewayError::CallFailed("not authenticated".into()))
    }

    /// The folder/view pair an idling session polls, if one is selected
    /// (spec.md §4.J: `IDLE` only ever required `State::Auth`, so a
    /// session can idle with nothing selected — in that case there's
    /// nothing to poll).
    pub fn selected(&mut self) -> Option<(&dyn Folder, &mut MailboxView)> {
        match (self.folder.as_deref(), self.view.as_mut()) {
            (Some(f), Some(v)) => Some((f, v)),
            _ => None,
        }
    }

    /// Dispatch one already-parsed command. `tag` is echoed back on the
    /// tagged response line; `UID`-prefixing has already been folded into
    /// the relevant [`Command`] variants by [`imap_proto::command::parse`].
    pub async fn dispatch(&mut self, tag: &str, command: Command) -> Outcome {
        let result = self.run(&command).await;
        self.finish(tag, &command, result).await
    }

    async fn finish(&mut self, tag: &str, command: &Command, result: Result<Effect, GatewayError>) -> Outcome {
        match result {
            Ok(effect) => {
                self.fail_count = 0;
                self.render_effect(tag, command, effect)
            }
            Err(e) => {
                if e.counts_as_failure() {
                    self.fail_count += 1;
                }
                let rendered = e.render();
                let mut lines = vec![imap_proto::response::tagged(tag, Status::No, rendered.code, &rendered.text)];
                if self.fail_count >= self.config.imap_max_fail_commands {
                    lines.push(untagged_status(Status::Ok, None, "BYE too many failed commands"));
                    return Outcome::Close(lines);
                }
                if matches!(e, GatewayError::EndOfSession | GatewayError::FeatureDisabled(_)) {
                    self.state = State::Logout;
                    return Outcome::Close(lines);
                }
                Outcome::Continue(lines)
            }
        }
    }

    fn render_effect(&mut self, tag: &str, command: &Command, effect: Effect) -> Outcome {
        match effect {
            Effect::Lines(mut lines, code) => {
                lines.push(imap_proto::response::tagged(tag, Status::Ok, code, &ok_text(command)));
                Outcome::Continue(lines)
            }
            Effect::StartTls(mut lines) => {
                lines.push(imap_proto::response::tagged(tag, Status::Ok, None, "Begin TLS negotiation now"));
                Outcome::StartTls(lines)
            }
            Effect::Idle => Outcome::EnterIdle(vec![imap_proto::response::continuation("waiting for notifications")]),
            Effect::Logout => {
                self.state = State::Logout;
                Outcome::Close(vec![
                    untagged_status(Status::Ok, None, "BYE logging out"),
                    imap_proto::response::tagged(tag, Status::Ok, None, "LOGOUT completed"),
                ])
            }
        }
    }

    async fn run(&mut self, command: &Command) -> Result<Effect, GatewayError> {
        match command {
            Command::Capability => {
                let caps = self.capabilities();
                Ok(Effect::plain(vec![untagged(&format!("CAPABILITY {}", caps.join(" ")))]))
            }
            Command::Noop => self.noop_or_check().await,
            Command::Check => self.noop_or_check().await,
            Command::Logout => Ok(Effect::Logout),
            Command::StartTls => {
                self.require_state(State::Unauth)?;
                if self.is_encrypted || !self.config.tls_enabled() {
                    return Err(GatewayError::NoSupport("STARTTLS".into()));
                }
                Ok(Effect::StartTls(Vec::new()))
            }
            Command::Authenticate { mechanism } => {
                if mechanism != "PLAIN" {
                    return Err(GatewayError::NoSupport(mechanism.clone()));
                }
                // This gateway only supports the non-interactive SASL PLAIN
                // form where the initial response is absent, requiring a
                // `+` continuation; the base64 challenge/response exchange
                // itself is handled by `crate::listener` before a user/pass
                // pair reaches here as a synthesized `Command::Login`.
                Err(GatewayError::NoSupport("AUTHENTICATE without initial response".into()))
            }
            Command::Login { user, pass } => {
                self.require_state(State::Unauth)?;
                if self.failed_logins >= LOGIN_RETRIES {
                    return Err(GatewayError::EndOfSession);
                }
                let store = self
                    .auth
                    .login(
                        user,
                        pass,
                        &self.peer,
                        store::Protocol::Imap,
                        self.is_encrypted,
                        self.is_local,
                        &mut self.failed_logins,
                    )
                    .await
                    .map_err(|e| {
                        if !matches!(e, GatewayError::FeatureDisabled(_)) && self.failed_logins >= LOGIN_RETRIES {
                            GatewayError::EndOfSession
                        } else {
                            e
                        }
                    })?;
                self.store = Some(store);
                self.state = State::Auth;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Select { mailbox } => self.select(&mailbox.0, false).await,
            Command::Examine { mailbox } => self.select(&mailbox.0, true).await,
            Command::Create { mailbox } => {
                self.require_state(State::Auth)?;
                self.store()?.create_folder(&mailbox.0).await?;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Delete { mailbox } => {
                self.require_state(State::Auth)?;
                if mailbox.0.eq_ignore_ascii_case("inbox") {
                    return Err(GatewayError::NoAccess("INBOX cannot be deleted".into()));
                }
                self.store()?.delete_folder(&mailbox.0).await?;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Rename { from, to } => {
                self.require_state(State::Auth)?;
                if from.0.eq_ignore_ascii_case("inbox") {
                    return Err(GatewayError::NoAccess("INBOX cannot be renamed".into()));
                }
                self.store()?.rename_folder(&from.0, &to.0).await?;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Subscribe { mailbox } => {
                self.require_state(State::Auth)?;
                self.store()?.subscribe(&mailbox.0).await?;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Unsubscribe { mailbox } => {
                self.require_state(State::Auth)?;
                self.store()?.unsubscribe(&mailbox.0).await?;
                Ok(Effect::plain(Vec::new()))
            }
            Command::List { reference, pattern } => self.list(&reference.0, pattern, false).await,
            Command::Lsub { reference, pattern } => self.list(&reference.0, pattern, true).await,
            Command::Status { mailbox, items } => self.status(&mailbox.0, items).await,
            Command::Append { mailbox, flags, date, message } => {
                self.require_state(State::Auth)?;
                if message.len() as u64 > self.config.imap_max_messagesize {
                    return Err(GatewayError::CallFailed("message too large".into()));
                }
                let folder = self.store()?.open_folder(&mailbox.0, true).await.map_err(|e| match e {
                    store::StoreError::NoSuchMailbox(_) => GatewayError::NotFound("trycreate".into()),
                    other => other.into(),
                })?;
                let code = mutate::append(folder.as_ref(), message.clone(), flags.clone(), date.as_deref()).await?;
                Ok(Effect::plain(vec![]).with_code(code))
            }
            Command::Close => {
                self.require_state(State::Selected)?;
                if let Some(folder) = self.folder.take() {
                    folder.close().await?;
                }
                self.view = None;
                self.state = State::Auth;
                Ok(Effect::plain(Vec::new()))
            }
            Command::Expunge { uid: _ } => {
                self.require_state(State::Selected)?;
                let folder = self.folder.as_deref().ok_or(GatewayError::CallFailed("no mailbox selected".into()))?;
                let view = self.view.as_mut().ok_or(GatewayError::CallFailed("no mailbox selected".into()))?;
                let lines = mutate::expunge(folder, view).await?;
                Ok(Effect::plain(lines))
            }
            Command::Search { uid, criteria } => {
                self.require_state(State::Selected)?;
                let key = SearchKey::parse(criteria).map_err(|e| GatewayError::CallFailed(e.to_string()))?;
                let folder = self.folder()?;
                let view = self.view()?;
                let uids = search::search(folder, view, &key).await?;
                let rendered = if *uid {
                    uids.iter().map(u32::to_string).collect::<Vec<_>>()
                } else {
                    uids.iter().filter_map(|u| view.seqnum_of(*u)).map(|s| s.to_string()).collect()
                };
                Ok(Effect::plain(vec![untagged(&format!("SEARCH {}", rendered.join(" ")))]))
            }
            Command::Fetch(args) => {
                self.require_state(State::Selected)?;
                let items = parse_items(&args.items).map_err(|e| GatewayError::CallFailed(e.to_string()))?;
                let view = self.view()?;
                let uids = view.resolve_uids(&args.sequence, args.uid);
                let folder = self.folder()?;
                let (lines, to_mark_seen) = fetch::fetch(folder, view, &uids, &items).await?;
                if !to_mark_seen.is_empty() {
                    let folder = self.folder()?;
                    for uid in to_mark_seen {
                        let _ = folder.store_flags(uid, StoreOp::Add, &[imap_proto::flag::Flag::Seen]).await;
                    }
                }
                Ok(Effect::plain(lines))
            }
            Command::Store(args) => {
                self.require_state(State::Selected)?;
                let view = self.view()?;
                let uids = view.resolve_uids(&args.sequence, args.uid);
                let folder = self.folder()?;
                let lines = mutate::store(folder, view, &uids, args.op, &args.flags, args.silent).await?;
                Ok(Effect::plain(lines))
            }
            Command::Copy { sequence, uid, mailbox } => {
                self.require_state(State::Selected)?;
                let view = self.view()?;
                let uids = view.resolve_uids(sequence, *uid);
                let folder = self.folder()?;
                let dest = self.store()?.open_folder(&mailbox.0, true).await.map_err(|e| match e {
                    store::StoreError::NoSuchMailbox(_) => GatewayError::NotFound("trycreate".into()),
                    other => other.into(),
                })?;
                let code = mutate::copy(folder, dest.as_ref(), &uids).await?;
                Ok(Effect::plain(Vec::new()).with_code(code))
            }
            Command::Move { sequence, uid, mailbox } => {
                self.require_state(State::Selected)?;
                let uids = self.view()?.resolve_uids(sequence, *uid);
                let dest = self.store()?.open_folder(&mailbox.0, true).await.map_err(|e| match e {
                    store::StoreError::NoSuchMailbox(_) => GatewayError::NotFound("trycreate".into()),
                    other => other.into(),
                })?;
                let folder = self.folder.as_deref().ok_or(GatewayError::CallFailed("no mailbox selected".into()))?;
                let view = self.view.as_mut().ok_or(GatewayError::CallFailed("no mailbox selected".into()))?;
                let (code, lines) = mutate::move_to(folder, view, dest.as_ref(), &uids).await?;
                Ok(Effect::plain(lines).with_code(code))
            }
            Command::Idle => {
                self.require_state(State::Auth)?;
                if !self.config.imap_capability_idle {
                    return Err(GatewayError::NoSupport("IDLE".into()));
                }
                Ok(Effect::Idle)
            }
            Command::Done => Err(GatewayError::CallFailed("DONE without IDLE".into())),
            Command::Namespace => {
                self.require_state(State::Auth)?;
                let ns = self.store()?.namespace().await;
                Ok(Effect::plain(vec![untagged(&format!(
                    "NAMESPACE ((\"{}\" \"{}\")) NIL NIL",
                    ns.personal.0, ns.personal.1
                ))]))
            }
            Command::GetQuotaRoot { mailbox } => {
                self.require_state(State::Auth)?;
                // Quota evaluation is out of scope (spec.md §1: the core
                // only calls Authenticate/OpenStore); no quota root ever
                // carries a hard limit, so only QUOTAROOT is reported.
                Ok(Effect::plain(vec![untagged(&format!("QUOTAROOT \"{}\" \"\"", mailbox.0))]))
            }
            Command::GetQuota { quota_root } => {
                self.require_state(State::Auth)?;
                if !quota_root.is_empty() {
                    return Err(GatewayError::CallFailed("Quota root does not exist".into()));
                }
                Ok(Effect::plain(Vec::new()))
            }
            Command::SetQuota { .. } => {
                self.require_state(State::Auth)?;
                Err(GatewayError::NoAccess("Permission denied".into()))
            }
            Command::Unknown { name } => Err(GatewayError::NoSupport(name.clone())),
        }
    }

    async fn noop_or_check(&mut self) -> Result<Effect, GatewayError> {
        if let (Some(folder), Some(view)) = (self.folder.as_deref(), self.view.as_mut()) {
            let lines = view.refresh(folder, false).await;
            return Ok(Effect::plain(lines));
        }
        Ok(Effect::plain(Vec::new()))
    }

    async fn select(&mut self, name: &str, read_only: bool) -> Result<Effect, GatewayError> {
        self.require_state(State::Auth)?;
        let folder = self.store()?.open_folder(name, !read_only).await.map_err(|e| match e {
            store::StoreError::NoSuchMailbox(_) => GatewayError::NotFound("trycreate".into()),
            other => other.into(),
        })?;
        let (view, mut lines) = MailboxView::select(folder.as_ref(), read_only || !folder.read_write()).await;
        lines.insert(0, untagged("FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)"));
        let permanent: Vec<String> = PERMANENT_FLAGS.iter().map(|f| f.to_string()).collect();
        lines.push(untagged_status(Status::Ok, Some(Code::Permanentflags(permanent)), "Limited"));
        lines.push(untagged_status(Status::Ok, Some(Code::UidValidity(view.uid_validity)), "UIDs valid"));
        lines.push(untagged_status(Status::Ok, Some(Code::UidNext(folder.uid_next())), "Predicted next UID"));
        let read_write_code = if view.read_only { Code::ReadOnly } else { Code::ReadWrite };
        lines.push(untagged_status(Status::Ok, Some(read_write_code), "selected"));
        self.folder = Some(folder);
        self.view = Some(view);
        self.state = State::Selected;
        Ok(Effect::plain(lines))
    }

    async fn list(&mut self, reference: &str, pattern: &str, subscribed_only: bool) -> Result<Effect, GatewayError> {
        self.require_state(State::Auth)?;
        let folders = self.store()?.list_folders(reference, pattern, subscribed_only).await?;
        let cmd_name = if subscribed_only { "LSUB" } else { "LIST" };
        let lines = folders
            .iter()
            .map(|f| {
                let mut attrs = Vec::new();
                if !f.selectable {
                    attrs.push("\\Noselect");
                }
                if f.has_children {
                    attrs.push("\\HasChildren");
                } else {
                    attrs.push("\\HasNoChildren");
                }
                untagged(&format!("{cmd_name} ({}) \"{}\" \"{}\"", attrs.join(" "), f.delimiter, f.name))
            })
            .collect();
        Ok(Effect::plain(lines))
    }

    async fn status(&mut self, name: &str, items: &[imap_proto::tokenizer::Token]) -> Result<Effect, GatewayError> {
        self.require_state(State::Auth)?;
        let counters = self.store()?.status(name).await?;
        let mut parts = Vec::new();
        for item in items {
            let Some(word) = item.as_str() else { continue };
            let value = match word.to_ascii_uppercase().as_str() {
                "MESSAGES" => counters.messages,
                "RECENT" => counters.recent,
                "UIDNEXT" => counters.uid_next,
                "UIDVALIDITY" => counters.uid_validity,
                "UNSEEN" => counters.unseen,
                other => return Err(GatewayError::CallFailed(format!("unknown STATUS item {other}"))),
            };
            parts.push(format!("{} {}", word.to_ascii_uppercase(), value));
        }
        Ok(Effect::plain(vec![untagged(&format!("STATUS \"{name}\" ({})", parts.join(" ")))]))
    }
}

/// The outcome of a successfully-executed command body, before the tagged
/// `OK` line is attached. `Lines` carries the untagged lines plus an
/// optional response code for the tagged `OK` itself (e.g. `APPENDUID`).
enum Effect {
    Lines(Vec<String>, Option<Code>),
    StartTls(Vec<String>),
    Idle,
    Logout,
}

impl Effect {
    fn plain(lines: Vec<String>) -> Effect {
        Effect::Lines(lines, None)
    }

    fn with_code(self, code: Code) -> Effect {
        match self {
            Effect::Lines(lines, _) => Effect::Lines(lines, Some(code)),
            other => other,
        }
    }
}

fn ok_text(command: &Command) -> String {
    match command {
        Command::Capability => "CAPABILITY completed".to_string(),
        Command::Noop => "NOOP completed".to_string(),
        Command::Check => "CHECK completed".to_string(),
        Command::Login { .. } => "LOGIN completed".to_string(),
        Command::Select { .. } => "SELECT completed".to_string(),
        Command::Examine { .. } => "EXAMINE completed".to_string(),
        Command::Create { .. } => "CREATE completed".to_string(),
        Command::Delete { .. } => "DELETE completed".to_string(),
        Command::Rename { .. } => "RENAME completed".to_string(),
        Command::Subscribe { .. } => "SUBSCRIBE completed".to_string(),
        Command::Unsubscribe { .. } => "UNSUBSCRIBE completed".to_string(),
        Command::List { .. } => "LIST completed".to_string(),
        Command::Lsub { .. } => "LSUB completed".to_string(),
        Command::Status { .. } => "STATUS completed".to_string(),
        Command::Append { .. } => "APPEND completed".to_string(),
        Command::Close => "CLOSE completed".to_string(),
        Command::Expunge { .. } => "EXPUNGE completed".to_string(),
        Command::Search { .. } => "SEARCH completed".to_string(),
        Command::Fetch(_) => "FETCH completed".to_string(),
        Command::Store(_) => "STORE completed".to_string(),
        Command::Copy { .. } => "COPY completed".to_string(),
        Command::Move { .. } => "XAOL-MOVE completed".to_string(),
        Command::Namespace => "NAMESPACE completed".to_string(),
        Command::GetQuotaRoot { .. } => "GETQUOTAROOT completed".to_string(),
        Command::GetQuota { .. } => "GETQUOTA completed".to_string(),
        Command::SetQuota { .. } => "SETQUOTA completed".to_string(),
        _ => "completed".to_string(),
    }
}
