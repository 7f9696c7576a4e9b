//! Gateway configuration (spec.md §6.3): a TOML file loaded via `serde` +
//! `toml`, the way `berker-z-otto` loads its own config, plus a small
//! `clap`-parsed CLI for the config path.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "gatewayd", about = "IMAP4rev1/POP3 gateway")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Parse and validate the configuration, then exit.
    #[arg(long)]
    pub check_config: bool,
}

fn default_process_model() -> ProcessModel {
    ProcessModel::Thread
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessModel {
    Thread,
    Fork,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogMethod {
    Auto,
    File,
    Syslog,
    Pipe,
}

impl Default for LogMethod {
    fn default() -> Self {
        LogMethod::Auto
    }
}

fn default_true() -> bool {
    true
}

fn default_max_fail_commands() -> u32 {
    10
}

fn default_max_messagesize() -> u64 {
    64 * 1024 * 1024
}

fn default_log_level() -> u8 {
    3
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub pop3_listen: Vec<String>,
    pub pop3s_listen: Vec<String>,
    pub imap_listen: Vec<String>,
    pub imaps_listen: Vec<String>,

    #[serde(default = "default_process_model")]
    pub process_model: ProcessModel,

    pub run_as_user: Option<String>,
    pub run_as_group: Option<String>,
    pub pid_file: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub imap_only_mailfolders: bool,
    pub imap_public_folders: bool,
    #[serde(default = "default_true")]
    pub imap_capability_idle: bool,
    #[serde(default = "default_max_fail_commands")]
    pub imap_max_fail_commands: u32,
    #[serde(default = "default_max_messagesize")]
    pub imap_max_messagesize: u64,
    pub imap_expunge_on_delete: bool,
    pub imap_ignore_command_idle: bool,

    pub disable_plaintext_auth: bool,

    pub server_socket: Option<String>,
    pub server_hostname: Option<String>,
    pub server_hostname_greeting: Option<String>,

    pub ssl_private_key_file: Option<PathBuf>,
    pub ssl_certificate_file: Option<PathBuf>,
    pub ssl_verify_client: bool,
    pub ssl_verify_file: Option<PathBuf>,
    pub ssl_verify_path: Option<PathBuf>,
    pub ssl_protocols: Vec<String>,
    pub ssl_ciphers: Option<String>,
    pub ssl_prefer_server_ciphers: bool,
    pub ssl_curves: Option<String>,

    #[serde(default)]
    pub log_method: LogMethod,
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: u8,
    pub log_timestamp: bool,
    pub log_buffer_size: Option<usize>,

    pub tmp_path: Option<PathBuf>,
    pub bypass_auth: bool,
    pub html_safety_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pop3_listen: Vec::new(),
            pop3s_listen: Vec::new(),
            imap_listen: vec!["0.0.0.0:143".to_string()],
            imaps_listen: Vec::new(),
            process_model: ProcessModel::Thread,
            run_as_user: None,
            run_as_group: None,
            pid_file: None,
            imap_only_mailfolders: true,
            imap_public_folders: false,
            imap_capability_idle: true,
            imap_max_fail_commands: default_max_fail_commands(),
            imap_max_messagesize: default_max_messagesize(),
            imap_expunge_on_delete: false,
            imap_ignore_command_idle: false,
            disable_plaintext_auth: true,
            server_socket: None,
            server_hostname: None,
            server_hostname_greeting: None,
            ssl_private_key_file: None,
            ssl_certificate_file: None,
            ssl_verify_client: false,
            ssl_verify_file: None,
            ssl_verify_path: None,
            ssl_protocols: vec!["tls1.2".into(), "tls1.3".into()],
            ssl_ciphers: None,
            ssl_prefer_server_ciphers: false,
            ssl_curves: None,
            log_method: LogMethod::Auto,
            log_file: None,
            log_level: default_log_level(),
            log_timestamp: true,
            log_buffer_size: None,
            tmp_path: None,
            bypass_auth: false,
            html_safety_filter: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// `0 .. 6` log_level maps to `tracing`'s level filters (spec.md §6.3).
    pub fn tracing_filter(&self) -> &'static str {
        match self.log_level {
            0 => "off",
            1 => "error",
            2 => "warn",
            3 => "info",
            4 => "debug",
            _ => "trace",
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.ssl_certificate_file.is_some() && self.ssl_private_key_file.is_some()
    }
}
