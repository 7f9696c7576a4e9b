//! Wire format for the IMAP4rev1/POP3 gateway.
//!
//! This crate knows nothing about mailboxes, stores, or sessions — it only
//! turns bytes into typed commands and typed values back into bytes. The
//! gateway crate drives a [`framer::GatewayCodec`] with a
//! `tokio_util::codec::Framed` transport, hands each [`framer::Frame`] to
//! [`command::parse`], executes it against the store, and renders results
//! with [`response`].

pub mod command;
pub mod datetime;
pub mod error;
pub mod fetch;
pub mod flag;
pub mod framer;
pub mod mutf7;
pub mod response;
pub mod search;
pub mod section;
pub mod sequence;
pub mod status;
pub mod tokenizer;
