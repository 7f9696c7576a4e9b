//! Component L: the listener / session supervisor (spec.md §4.L).
//!
//! One `TcpListener` per configured `*_listen` address; each accepted
//! connection gets its own `tokio::spawn`ed task rather than a fork
//! (`process_model = thread`'s equivalent here — `ProcessModel::Fork`
//! is parsed from config but not implemented, noted in `DESIGN.md`). TLS
//! termination for the `s`-suffixed listeners and in-place `STARTTLS`
//! upgrades both go through `tokio_rustls`. The per-session read loop —
//! accept, greet, read with a timeout, dispatch, repeat until
//! `LOGOUT`/`BYE`/timeout — follows the teacher's `tokio_server` demo
//! (a `Framed` `Sink`/`Stream` pair driving one socket).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::{rustls, TlsAcceptor};
use tokio_util::codec::{Decoder, Framed};

use imap_proto::command::{self, Command};
use imap_proto::framer::{CommandLine, Frame, FramerError, GatewayCodec};
use imap_proto::response::{self, Code, Status};

use crate::auth::AuthPolicy;
use crate::config::Config;
use crate::idle;
use crate::pop3;
use crate::session::{Outcome, Session, State};

/// spec.md §4.A: the largest literal this gateway will accept before
/// bailing with a `NO [ALERT]` and draining the offending bytes.
const MAX_LITERAL: u32 = 32 * 1024 * 1024;

/// spec.md §4.L's `serviceTimeoutMinutes`, split the way the original
/// does between an ordinary command wait and an `IDLE` wait.
const SERVICE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(29 * 60);

pub async fn run(config: Arc<Config>, auth: Arc<AuthPolicy>) -> Result<()> {
    let tls_acceptor = load_tls(&config)?;

    let mut tasks = Vec::new();
    for addr in &config.imap_listen {
        tasks.push(spawn_imap_accept_loop(addr.clone(), config.clone(), auth.clone(), tls_acceptor.clone(), false).await?);
    }
    for addr in &config.imaps_listen {
        let acceptor = tls_acceptor
            .clone()
            .context("imaps_listen configured without ssl_certificate_file/ssl_private_key_file")?;
        tasks.push(spawn_imap_accept_loop(addr.clone(), config.clone(), auth.clone(), Some(acceptor), true).await?);
    }
    for addr in &config.pop3_listen {
        tasks.push(spawn_pop3_accept_loop(addr.clone(), config.clone(), auth.clone(), tls_acceptor.clone(), false).await?);
    }
    for addr in &config.pop3s_listen {
        let acceptor = tls_acceptor
            .clone()
            .context("pop3s_listen configured without ssl_certificate_file/ssl_private_key_file")?;
        tasks.push(spawn_pop3_accept_loop(addr.clone(), config.clone(), auth.clone(), Some(acceptor), true).await?);
    }

    if tasks.is_empty() {
        anyhow::bail!("no listening sockets configured (pop3_listen/pop3s_listen/imap_listen/imaps_listen are all empty)");
    }

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, stopping accept loops");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

fn load_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    let (Some(cert_path), Some(key_path)) = (&config.ssl_certificate_file, &config.ssl_private_key_file) else {
        return Ok(None);
    };

    let cert_file = std::fs::File::open(cert_path).with_context(|| format!("opening {}", cert_path.display()))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificate chain from {}", cert_path.display()))?;

    let key_file = std::fs::File::open(key_path).with_context(|| format!("opening {}", key_path.display()))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .with_context(|| format!("reading private key from {}", key_path.display()))?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS server config")?;

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut hup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = int.recv() => tracing::info!("received SIGINT"),
            _ = hup.recv() => tracing::info!("received SIGHUP"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn is_local_addr(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
}

async fn spawn_imap_accept_loop(
    addr: String,
    config: Arc<Config>,
    auth: Arc<AuthPolicy>,
    tls_acceptor: Option<TlsAcceptor>,
    pre_encrypted: bool,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding IMAP listener on {addr}"))?;
    tracing::info!(addr, tls = pre_encrypted, "IMAP listener bound");
    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let config = config.clone();
                    let auth = auth.clone();
                    let tls_acceptor = tls_acceptor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_imap_connection(stream, peer, config, auth, tls_acceptor, pre_encrypted).await {
                            tracing::warn!(%peer, error = %e, "IMAP session ended with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(addr, error = %e, "accept failed"),
            }
        }
    }))
}

async fn spawn_pop3_accept_loop(
    addr: String,
    config: Arc<Config>,
    auth: Arc<AuthPolicy>,
    tls_acceptor: Option<TlsAcceptor>,
    pre_encrypted: bool,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding POP3 listener on {addr}"))?;
    tracing::info!(addr, tls = pre_encrypted, "POP3 listener bound");
    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let config = config.clone();
                    let auth = auth.clone();
                    let tls_acceptor = tls_acceptor.clone();
                    tokio::spawn(async move {
                        let is_local = is_local_addr(&peer);
                        let result = if pre_encrypted {
                            match tls_acceptor.clone() {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(tls_stream) => pop3::run(tls_stream, peer.to_string(), config, auth, None, true, is_local).await,
                                    Err(e) => Err(e).context("POP3 TLS handshake failed"),
                                },
                                None => Err(anyhow::anyhow!("pop3s listener without a TLS acceptor")),
                            }
                        } else {
                            pop3::run(stream, peer.to_string(), config, auth, tls_acceptor, false, is_local).await
                        };
                        if let Err(e) = result {
                            tracing::warn!(%peer, error = %e, "POP3 session ended with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(addr, error = %e, "accept failed"),
            }
        }
    }))
}

async fn handle_imap_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    auth: Arc<AuthPolicy>,
    tls_acceptor: Option<TlsAcceptor>,
    pre_encrypted: bool,
) -> Result<()> {
    let is_local = is_local_addr(&peer);
    if pre_encrypted {
        let acceptor = tls_acceptor.context("imaps connection without a TLS acceptor")?;
        let tls_stream = acceptor.accept(stream).await.context("IMAP TLS handshake failed")?;
        run_imap_session(tls_stream, peer.to_string(), config, auth, None, true, is_local).await
    } else {
        run_imap_session(stream, peer.to_string(), config, auth, tls_acceptor, false, is_local).await
    }
}

/// Drives one IMAP connection to completion. `pub` so integration tests
/// can exercise the full session loop over an in-memory `tokio::io::duplex`
/// pair instead of a real `TcpListener` (spec.md §8's Properties L1-L5).
pub async fn run_imap_session<S>(
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
    let max_literal = config.imap_max_messagesize.min(MAX_LITERAL as u64) as u32;
    let mut framed = GatewayCodec::new(max_literal).framed(stream);
    let mut session = Session::new(config.clone(), auth.clone(), peer.clone(), is_encrypted, is_local);

    framed.send(session.greeting()).await.context("sending greeting")?;

    loop {
        let read_timeout = if session.state == State::Idle { IDLE_TIMEOUT } else { SERVICE_TIMEOUT };
        let frame = match timeout(read_timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(FramerError::LiteralTooLarge { tag, size }))) => {
                tracing::warn!(%peer, size, "literal exceeds configured maximum message size");
                let tag = tag.map(|t| String::from_utf8_lossy(&t).into_owned()).unwrap_or_else(|| "*".to_string());
                framed
                    .send(response::tagged(&tag, Status::No, Some(Code::Alert), "Maximum message size reached"))
                    .await
                    .context("writing response")?;
                continue;
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(%peer, error = %e, "framing error");
                framed.send(response::untagged_status(Status::Bad, None, "protocol error")).await.ok();
                break;
            }
            Ok(None) => break,
            Err(_) => {
                framed.send(response::untagged_status(Status::Ok, None, "BYE autologout")).await.ok();
                break;
            }
        };

        match frame {
            Frame::ContinuationNeeded { size } => {
                framed
                    .send(response::continuation(&format!("Ready for literal data ({size} bytes)")))
                    .await
                    .context("writing response")?;
            }
            Frame::Command(line) => {
                let (tag, command) = match command::parse(line) {
                    Ok(tc) => (tc.tag, tc.command),
                    Err(e) => {
                        framed.send(response::tagged("*", Status::Bad, None, &e.to_string())).await.context("writing response")?;
                        continue;
                    }
                };

                if let Command::Authenticate { mechanism } = &command {
                    if mechanism == "PLAIN" {
                        handle_authenticate_plain(&mut framed, &mut session, &tag).await?;
                        continue;
                    }
                }

                match session.dispatch(&tag, command).await {
                    Outcome::Continue(lines) => {
                        for line in lines {
                            framed.send(line).await.context("writing response")?;
                        }
                    }
                    Outcome::Close(lines) => {
                        for line in lines {
                            framed.send(line).await.ok();
                        }
                        break;
                    }
                    Outcome::StartTls(lines) => {
                        for line in lines {
                            framed.send(line).await.context("writing response")?;
                        }
                        let acceptor = tls_acceptor.clone().context("STARTTLS accepted without a configured acceptor")?;
                        let stream = framed.into_inner();
                        let tls_stream = acceptor.accept(stream).await.context("STARTTLS handshake failed")?;
                        return Box::pin(run_imap_session(tls_stream, peer, config, auth, None, true, is_local)).await;
                    }
                    Outcome::EnterIdle(lines) => {
                        for line in lines {
                            framed.send(line).await.context("writing response")?;
                        }
                        let prior_state = session.state;
                        session.state = State::Idle;
                        run_idle_loop(&mut framed, &mut session, &tag, prior_state).await?;
                    }
                }
            }
        }

        if session.state == State::Logout {
            break;
        }
    }
    Ok(())
}

/// spec.md §4.N's `AUTHENTICATE PLAIN` continuation exchange: the
/// base64 challenge/response never reaches [`crate::session::Session`] —
/// once decoded it's folded into the same `Command::Login` path `LOGIN`
/// uses, which is why the completed tagged line still reads `LOGIN
/// completed` rather than `AUTHENTICATE completed` (recorded as an Open
/// Question decision in `DESIGN.md`).
async fn handle_authenticate_plain<S>(framed: &mut Framed<S, GatewayCodec>, session: &mut Session, tag: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if session.state != State::Unauth {
        framed
            .send(response::tagged(tag, Status::Bad, None, "AUTHENTICATE not permitted in this state"))
            .await
            .context("writing response")?;
        return Ok(());
    }

    framed.send(response::continuation("")).await.context("writing response")?;

    let response_line = match framed.next().await {
        Some(Ok(Frame::Command(line))) => line,
        _ => {
            framed.send(response::tagged(tag, Status::Bad, None, "invalid AUTHENTICATE response")).await.ok();
            return Ok(());
        }
    };
    let Some(b64) = response_line.tokens.first().and_then(|t| t.as_str()) else {
        framed.send(response::tagged(tag, Status::Bad, None, "invalid AUTHENTICATE response")).await.ok();
        return Ok(());
    };
    if b64 == "*" {
        framed.send(response::tagged(tag, Status::Bad, None, "AUTHENTICATE cancelled")).await.ok();
        return Ok(());
    }

    let decoded = match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64.as_bytes()) {
        Ok(d) => d,
        Err(_) => {
            framed.send(response::tagged(tag, Status::Bad, None, "malformed base64")).await.ok();
            return Ok(());
        }
    };
    let mut fields = decoded.split(|&b| b == 0);
    let _authzid = fields.next();
    let user = fields.next().and_then(|b| std::str::from_utf8(b).ok()).unwrap_or("").to_string();
    let pass = fields.next().and_then(|b| std::str::from_utf8(b).ok()).unwrap_or("").to_string();

    match session.dispatch(tag, Command::Login { user, pass }).await {
        Outcome::Continue(lines) => {
            for line in lines {
                framed.send(line).await.context("writing response")?;
            }
        }
        Outcome::Close(lines) => {
            for line in lines {
                framed.send(line).await.ok();
            }
            anyhow::bail!("session ended during AUTHENTICATE");
        }
        Outcome::StartTls(_) | Outcome::EnterIdle(_) => unreachable!("LOGIN never produces this outcome"),
    }
    Ok(())
}

async fn run_idle_loop<S>(
    framed: &mut Framed<S, GatewayCodec>,
    session: &mut Session,
    tag: &str,
    prior_state: State,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut ticker = tokio::time::interval(idle::POLL_INTERVAL);
    let started = tokio::time::Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if started.elapsed() >= IDLE_TIMEOUT {
                    framed.send(response::untagged_status(Status::Ok, None, "BYE autologout while idling")).await.ok();
                    session.state = State::Logout;
                    anyhow::bail!("idle timeout");
                }
                if let Some((folder, view)) = session.selected() {
                    for line in idle::tick(folder, view).await {
                        framed.send(line).await.context("writing idle notification")?;
                    }
                }
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(Frame::Command(line))) if is_done_line(&line) => {
                        session.state = prior_state;
                        framed.send(response::tagged(tag, Status::Ok, None, "IDLE terminated")).await.context("writing response")?;
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        tracing::debug!(tag, "ignoring non-DONE input while idling");
                    }
                    Some(Err(e)) => anyhow::bail!("framing error while idling: {e}"),
                    None => anyhow::bail!("connection closed while idling"),
                }
            }
        }
    }
}

fn is_done_line(line: &CommandLine) -> bool {
    matches!(line.tokens.as_slice(), [tok] if tok.as_str().map(|s| s.eq_ignore_ascii_case("DONE")).unwrap_or(false))
}
