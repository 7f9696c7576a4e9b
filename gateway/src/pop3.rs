//! Component M: the condensed POP3 session (spec.md §4.M).
//!
//! POP3 has no literal framing and no tagged responses, so this is a
//! self-contained session loop over `tokio_util::codec::LinesCodec`
//! rather than reusing the IMAP [`crate::session::Session`] dispatcher.
//! The message list is snapshotted once, on a successful `PASS`, per
//! RFC 1939's requirement that message numbers stay stable for the rest
//! of the session even as later commands mark messages `\Deleted`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::{Framed, LinesCodec};

use imap_proto::command::StoreOp;
use imap_proto::flag::Flag;
use store::{Folder, MessageMeta, Store};

use crate::auth::{AuthPolicy, LOGIN_RETRIES};
use crate::config::Config;
use crate::error::GatewayError;

enum State {
    Authorization,
    Transaction,
}

pub async fn run<S>(
    stream: S,
    peer: String,
    config: Arc<Config>,
    auth: Arc<AuthPolicy>,
    tls_acceptor: Option<TlsAcceptor>,
    is_encrypted: bool,
    is_local: bool,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = LinesCodec::new().framed(stream);
    lines.send("+OK POP3 gateway ready".to_string()).await.context("sending greeting")?;

    let mut state = State::Authorization;
    let mut store: Option<Arc<dyn Store>> = None;
    let mut folder: Option<Box<dyn Folder>> = None;
    let mut snapshot: Vec<MessageMeta> = Vec::new();
    let mut deleted: HashSet<u32> = HashSet::new();
    let mut pending_user: Option<String> = None;
    let mut failed_logins = 0u32;

    loop {
        let line = match lines.next().await {
            Some(Ok(l)) => l,
            Some(Err(e)) => {
                tracing::warn!(%peer, error = %e, "POP3 line error");
                break;
            }
            None => break,
        };
        let trimmed = line.trim_end();
        let mut parts = trimmed.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg = parts.next().unwrap_or("").trim();
        let in_transaction = matches!(state, State::Transaction);

        match (in_transaction, verb.as_str()) {
            (_, "QUIT") => {
                if let Some(f) = folder.take() {
                    if !deleted.is_empty() {
                        for &uid in &deleted {
                            let _ = f.store_flags(uid, StoreOp::Add, &[Flag::Deleted]).await;
                        }
                        let _ = f.expunge().await;
                    }
                    let _ = f.close().await;
                }
                lines.send("+OK gateway signing off".to_string()).await.ok();
                break;
            }
            (_, "CAPA") => {
                lines.send("+OK Capability list follows".to_string()).await.context("writing response")?;
                lines.send("USER".to_string()).await.context("writing response")?;
                lines.send("UIDL".to_string()).await.context("writing response")?;
                lines.send("TOP".to_string()).await.context("writing response")?;
                if config.tls_enabled() && !is_encrypted {
                    lines.send("STLS".to_string()).await.context("writing response")?;
                }
                lines.send(".".to_string()).await.context("writing response")?;
            }
            (false, "STLS") if !is_encrypted && config.tls_enabled() => {
                lines.send("+OK Begin TLS negotiation".to_string()).await.context("writing response")?;
                let acceptor = tls_acceptor.clone().context("STLS accepted without a configured acceptor")?;
                let stream = lines.into_inner();
                let tls_stream = acceptor.accept(stream).await.context("STLS handshake failed")?;
                return Box::pin(run(tls_stream, peer, config, auth, None, true, is_local)).await;
            }
            (_, "STLS") => {
                lines.send("-ERR STLS not available".to_string()).await.context("writing response")?;
            }
            (false, "USER") => {
                pending_user = Some(arg.to_string());
                lines.send("+OK send PASS".to_string()).await.context("writing response")?;
            }
            (false, "PASS") => {
                let Some(user) = pending_user.take() else {
                    lines.send("-ERR USER required first".to_string()).await.context("writing response")?;
                    continue;
                };
                if failed_logins >= LOGIN_RETRIES {
                    lines.send("-ERR too many failed attempts".to_string()).await.ok();
                    break;
                }
                match auth.login(&user, arg, &peer, store::Protocol::Pop3, is_encrypted, is_local, &mut failed_logins).await {
                    Ok(s) => match s.open_folder("INBOX", true).await {
                        Ok(f) => {
                            let mut msgs = f.messages().await;
                            msgs.sort_by_key(|m| m.uid);
                            snapshot = msgs;
                            folder = Some(f);
                            store = Some(s);
                            state = State::Transaction;
                            lines.send(format!("+OK mailbox ready, {} messages", snapshot.len())).await.context("writing response")?;
                        }
                        Err(e) => {
                            lines.send(format!("-ERR {e}")).await.context("writing response")?;
                        }
                    },
                    Err(GatewayError::FeatureDisabled(protocol)) => {
                        lines.send(format!("-ERR LOGIN {protocol} feature disabled")).await.context("writing response")?;
                        break;
                    }
                    Err(_) => {
                        lines.send("-ERR authentication failed".to_string()).await.context("writing response")?;
                    }
                }
            }
            (false, "APOP") => {
                // spec.md's supplemented-features list: APOP is parsed but
                // never usable, since the Store Interface has no shared-
                // secret/challenge primitive for it.
                lines.send("-ERR command not supported".to_string()).await.context("writing response")?;
            }
            (false, _) => {
                lines.send("-ERR not authenticated".to_string()).await.context("writing response")?;
            }
            (true, "NOOP") => {
                lines.send("+OK".to_string()).await.context("writing response")?;
            }
            (true, "RSET") => {
                deleted.clear();
                lines.send("+OK".to_string()).await.context("writing response")?;
            }
            (true, "STAT") => {
                let (count, size) = stat(&snapshot, &deleted);
                lines.send(format!("+OK {count} {size}")).await.context("writing response")?;
            }
            (true, "LIST") => list(&mut lines, &snapshot, &deleted, arg).await?,
            (true, "UIDL") => uidl(&mut lines, &snapshot, &deleted, arg).await?,
            (true, "DELE") => match resolve_number(&snapshot, &deleted, arg) {
                Some(uid) => {
                    deleted.insert(uid);
                    lines.send("+OK message deleted".to_string()).await.context("writing response")?;
                }
                None => {
                    lines.send("-ERR no such message".to_string()).await.context("writing response")?;
                }
            },
            (true, "RETR") => retrieve(&mut lines, folder.as_deref(), &snapshot, &deleted, arg, None).await?,
            (true, "TOP") => {
                let mut it = arg.split_whitespace();
                let num = it.next().unwrap_or("");
                let n = it.next().and_then(|s| s.parse::<usize>().ok());
                retrieve(&mut lines, folder.as_deref(), &snapshot, &deleted, num, n).await?;
            }
            (true, other) => {
                lines.send(format!("-ERR unknown command {other}")).await.context("writing response")?;
            }
        }
    }

    if store.is_some() {
        tracing::info!(%peer, "POP3 session closed");
    }
    Ok(())
}

fn stat(snapshot: &[MessageMeta], deleted: &HashSet<u32>) -> (usize, u32) {
    snapshot.iter().filter(|m| !deleted.contains(&m.uid)).fold((0usize, 0u32), |(c, s), m| (c + 1, s + m.size))
}

fn resolve_number(snapshot: &[MessageMeta], deleted: &HashSet<u32>, arg: &str) -> Option<u32> {
    let n: usize = arg.trim().parse().ok()?;
    if n == 0 || n > snapshot.len() {
        return None;
    }
    let meta = &snapshot[n - 1];
    if deleted.contains(&meta.uid) {
        return None;
    }
    Some(meta.uid)
}

async fn list<S>(
    lines: &mut Framed<S, LinesCodec>,
    snapshot: &[MessageMeta],
    deleted: &HashSet<u32>,
    arg: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if arg.is_empty() {
        let (count, _) = stat(snapshot, deleted);
        lines.send(format!("+OK {count} messages")).await.context("writing response")?;
        for (i, m) in snapshot.iter().enumerate() {
            if deleted.contains(&m.uid) {
                continue;
            }
            lines.send(format!("{} {}", i + 1, m.size)).await.context("writing response")?;
        }
        lines.send(".".to_string()).await.context("writing response")?;
    } else {
        match resolve_number(snapshot, deleted, arg) {
            Some(uid) => {
                let idx = snapshot.iter().position(|m| m.uid == uid).unwrap();
                lines.send(format!("+OK {} {}", idx + 1, snapshot[idx].size)).await.context("writing response")?;
            }
            None => {
                lines.send("-ERR no such message".to_string()).await.context("writing response")?;
            }
        }
    }
    Ok(())
}

async fn uidl<S>(
    lines: &mut Framed<S, LinesCodec>,
    snapshot: &[MessageMeta],
    deleted: &HashSet<u32>,
    arg: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if arg.is_empty() {
        lines.send("+OK".to_string()).await.context("writing response")?;
        for (i, m) in snapshot.iter().enumerate() {
            if deleted.contains(&m.uid) {
                continue;
            }
            lines.send(format!("{} {}", i + 1, m.uid)).await.context("writing response")?;
        }
        lines.send(".".to_string()).await.context("writing response")?;
    } else {
        match resolve_number(snapshot, deleted, arg) {
            Some(uid) => {
                let idx = snapshot.iter().position(|m| m.uid == uid).unwrap();
                lines.send(format!("+OK {} {}", idx + 1, uid)).await.context("writing response")?;
            }
            None => {
                lines.send("-ERR no such message".to_string()).await.context("writing response")?;
            }
        }
    }
    Ok(())
}

/// `RETR` (`top_lines: None`) or `TOP <n>` (`top_lines: Some(n)`), both
/// dot-stuffed per RFC 1939 §3.
async fn retrieve<S>(
    lines: &mut Framed<S, LinesCodec>,
    folder: Option<&dyn Folder>,
    snapshot: &[MessageMeta],
    deleted: &HashSet<u32>,
    arg: &str,
    top_lines: Option<usize>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(folder) = folder else {
        lines.send("-ERR no mailbox open".to_string()).await.context("writing response")?;
        return Ok(());
    };
    let Some(uid) = resolve_number(snapshot, deleted, arg) else {
        lines.send("-ERR no such message".to_string()).await.context("writing response")?;
        return Ok(());
    };
    let raw = match folder.raw(uid).await {
        Ok(r) => r,
        Err(e) => {
            lines.send(format!("-ERR {e}")).await.context("writing response")?;
            return Ok(());
        }
    };
    lines.send("+OK message follows".to_string()).await.context("writing response")?;

    let text = String::from_utf8_lossy(&raw);
    let mut in_header = true;
    let mut emitted_body = 0usize;
    for body_line in text.split("\r\n") {
        if in_header {
            lines.send(dot_stuff(body_line)).await.context("writing response")?;
            if body_line.is_empty() {
                in_header = false;
                if top_lines == Some(0) {
                    break;
                }
            }
            continue;
        }
        if let Some(n) = top_lines {
            if emitted_body >= n {
                break;
            }
            emitted_body += 1;
        }
        lines.send(dot_stuff(body_line)).await.context("writing response")?;
    }
    lines.send(".".to_string()).await.context("writing response")?;
    Ok(())
}

fn dot_stuff(line: &str) -> String {
    if line.starts_with('.') {
        format!(".{line}")
    } else {
        line.to_string()
    }
}
