//! `gatewayd`: the IMAP4rev1/POP3 gateway binary (spec.md §6).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use gateway::auth::AuthPolicy;
use gateway::config::{Cli, Config, LogMethod};
use gateway::listener;
use store::mem::MemAuthenticator;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;

    let _guard = init_logging(&config)?;

    if cli.check_config {
        tracing::info!("configuration OK");
        return Ok(());
    }

    let authenticator = Arc::new(build_authenticator());
    let auth = Arc::new(AuthPolicy::new(authenticator, config.disable_plaintext_auth));
    let config = Arc::new(config);

    listener::run(config, auth).await
}

/// Seeds accounts from `GATEWAY_DEV_USER`/`GATEWAY_DEV_PASS` (loaded via
/// `dotenvy` above, kept out of the TOML file). The real MAPI-backed
/// store is out of scope (spec.md §1), so this binary always runs
/// against `store::mem` — the fake backend the Store Interface exists
/// to make possible for smoke-testing, not a production credential
/// store.
fn build_authenticator() -> MemAuthenticator {
    let mut auth = MemAuthenticator::new();
    if let (Ok(user), Ok(pass)) = (std::env::var("GATEWAY_DEV_USER"), std::env::var("GATEWAY_DEV_PASS")) {
        auth = auth.with_account(&user, &pass);
    }
    auth
}

/// spec.md §6.3's `log_method`: `file` gets daily-rotated output via
/// `tracing-appender`; `syslog` has no vetted crate in the corpus, so it
/// falls back to stderr with a one-time warning (recorded as an Open
/// Question decision in `DESIGN.md`); `pipe`/`auto` both write stdout.
fn init_logging(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_new(config.tracing_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_method {
        LogMethod::File => {
            let path = config.log_file.clone().context("log_method = \"file\" requires log_file")?;
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().context("log_file has no file name")?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            Ok(Some(guard))
        }
        LogMethod::Syslog => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
            tracing::warn!("log_method = \"syslog\" is not implemented, logging to stderr instead");
            Ok(None)
        }
        LogMethod::Pipe | LogMethod::Auto => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
