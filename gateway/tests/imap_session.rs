//! End-to-end IMAP sessions driven over an in-memory duplex stream, the
//! same way the teacher's `tokio_server` demo drives one real `TcpStream`
//! (spec.md §8's session-level properties L1-L5).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::time::timeout;

use gateway::auth::AuthPolicy;
use gateway::config::Config;
use gateway::listener::run_imap_session;
use store::mem::MemAuthenticator;

fn test_config() -> Arc<Config> {
    Arc::new(Config { disable_plaintext_auth: false, ..Default::default() })
}

fn test_auth() -> Arc<AuthPolicy> {
    let authenticator: Arc<dyn store::Authenticator> = Arc::new(MemAuthenticator::new().with_account("alice", "secret"));
    Arc::new(AuthPolicy::new(authenticator, false))
}

async fn send(client: &mut BufReader<DuplexStream>, line: &str) {
    client.get_mut().write_all(line.as_bytes()).await.unwrap();
}

async fn read_line(client: &mut BufReader<DuplexStream>) -> String {
    let mut line = String::new();
    timeout(Duration::from_secs(5), client.read_line(&mut line)).await.expect("timed out waiting for a line").unwrap();
    line.trim_end().to_string()
}

/// Reads lines until one whose first word equals `tag` (the tagged
/// completion), returning everything read including that line.
async fn read_until_tagged(client: &mut BufReader<DuplexStream>, tag: &str) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(client).await;
        let tagged = line.split_whitespace().next() == Some(tag);
        lines.push(line);
        if tagged {
            return lines;
        }
    }
}

#[tokio::test]
async fn capability_login_select_empty_inbox_then_logout() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let auth = test_auth();
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "127.0.0.1:9999".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    let greeting = read_line(&mut client).await;
    assert!(greeting.starts_with("* OK"), "unexpected greeting: {greeting}");
    assert!(greeting.contains("CAPABILITY"));

    send(&mut client, "a1 CAPABILITY\r\n").await;
    let lines = read_until_tagged(&mut client, "a1").await;
    assert!(lines[0].starts_with("* CAPABILITY"));
    assert!(lines[0].contains("IMAP4rev1"));
    assert_eq!(lines.last().unwrap(), "a1 OK CAPABILITY completed");

    send(&mut client, "a2 LOGIN alice secret\r\n").await;
    let lines = read_until_tagged(&mut client, "a2").await;
    assert_eq!(lines.last().unwrap(), "a2 OK LOGIN completed");

    send(&mut client, "a3 SELECT INBOX\r\n").await;
    let lines = read_until_tagged(&mut client, "a3").await;
    assert!(lines.iter().any(|l| l == "* 0 EXISTS"));
    assert!(lines.iter().any(|l| l == "* 0 RECENT"));
    assert!(lines.iter().any(|l| l.starts_with("* FLAGS")));
    assert!(lines.iter().any(|l| l.contains("READ-WRITE")));
    assert_eq!(lines.last().unwrap(), "a3 OK SELECT completed");

    send(&mut client, "a4 LOGOUT\r\n").await;
    let lines = read_until_tagged(&mut client, "a4").await;
    assert!(lines.iter().any(|l| l.starts_with("* BYE")));
    assert_eq!(lines.last().unwrap(), "a4 OK LOGOUT completed");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected_and_retries_are_counted() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let auth = test_auth();
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    read_line(&mut client).await; // greeting

    send(&mut client, "a1 LOGIN alice wrong\r\n").await;
    let lines = read_until_tagged(&mut client, "a1").await;
    assert!(lines.last().unwrap().starts_with("a1 NO"));
}

#[tokio::test]
async fn append_with_literal_then_fetch_body_section() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let auth = test_auth();
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    read_line(&mut client).await; // greeting

    send(&mut client, "a1 LOGIN alice secret\r\n").await;
    read_until_tagged(&mut client, "a1").await;

    let body = "Subject: hello\r\n\r\nhello world\r\n";
    send(&mut client, &format!("a2 APPEND INBOX (\\Seen) {{{}+}}\r\n{body}", body.len())).await;
    let lines = read_until_tagged(&mut client, "a2").await;
    assert!(lines.last().unwrap().starts_with("a2 OK"));

    send(&mut client, "a3 SELECT INBOX\r\n").await;
    let lines = read_until_tagged(&mut client, "a3").await;
    assert!(lines.iter().any(|l| l == "* 1 EXISTS"));

    send(&mut client, "a4 FETCH 1 (BODY[TEXT])\r\n").await;
    let lines = read_until_tagged(&mut client, "a4").await;
    assert!(lines.iter().any(|l| l.contains("hello world")), "missing body text in {lines:?}");
    assert_eq!(lines.last().unwrap(), "a4 OK FETCH completed");
}

#[tokio::test]
async fn idle_is_terminated_by_done() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let auth = test_auth();
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    read_line(&mut client).await; // greeting

    send(&mut client, "a1 LOGIN alice secret\r\n").await;
    read_until_tagged(&mut client, "a1").await;

    send(&mut client, "a2 IDLE\r\n").await;
    let continuation = read_line(&mut client).await;
    assert!(continuation.starts_with('+'));

    send(&mut client, "DONE\r\n").await;
    let done_line = read_line(&mut client).await;
    assert_eq!(done_line, "a2 OK IDLE terminated");
}

#[tokio::test]
async fn login_with_imap_disabled_is_refused_and_session_closes() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let authenticator: Arc<dyn store::Authenticator> =
        Arc::new(MemAuthenticator::new().with_account_features("carol", "locked", false, true));
    let auth = Arc::new(AuthPolicy::new(authenticator, false));
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    read_line(&mut client).await; // greeting

    send(&mut client, "a1 LOGIN carol locked\r\n").await;
    let lines = read_until_tagged(&mut client, "a1").await;
    assert_eq!(lines.last().unwrap(), "a1 NO LOGIN imap feature disabled");

    // The session is forcibly closed afterward (spec.md §4.N: "NO LOGIN
    // imap feature disabled and close"), so the next read hits EOF.
    let mut trailing = String::new();
    client.read_line(&mut trailing).await.unwrap();
    assert!(trailing.is_empty(), "expected EOF after feature-disabled login, got {trailing:?}");
}

#[tokio::test]
async fn quota_commands() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let config = test_config();
    let auth = test_auth();
    tokio::spawn(async move {
        let _ = run_imap_session(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = BufReader::new(client_stream);
    read_line(&mut client).await; // greeting
    send(&mut client, "a1 LOGIN alice secret\r\n").await;
    read_until_tagged(&mut client, "a1").await;

    send(&mut client, "a2 GETQUOTAROOT INBOX\r\n").await;
    let lines = read_until_tagged(&mut client, "a2").await;
    assert!(lines.iter().any(|l| l == "* QUOTAROOT \"INBOX\" \"\""));
    assert_eq!(lines.last().unwrap(), "a2 OK GETQUOTAROOT completed");

    send(&mut client, "a3 GETQUOTA \"\"\r\n").await;
    let lines = read_until_tagged(&mut client, "a3").await;
    assert_eq!(lines.last().unwrap(), "a3 OK GETQUOTA completed");

    send(&mut client, "a4 GETQUOTA nonexistent\r\n").await;
    let lines = read_until_tagged(&mut client, "a4").await;
    assert_eq!(lines.last().unwrap(), "a4 NO Quota root does not exist");

    send(&mut client, "a5 SETQUOTA \"\" (STORAGE 512000)\r\n").await;
    let lines = read_until_tagged(&mut client, "a5").await;
    assert_eq!(lines.last().unwrap(), "a5 NO Permission denied");
}
