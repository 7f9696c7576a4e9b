use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("backend unavailable: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mailbox {0:?} does not exist")]
    NoSuchMailbox(String),
    #[error("mailbox {0:?} already exists")]
    MailboxExists(String),
    #[error("mailbox is not selected")]
    NoMailboxSelected,
    #[error("mailbox is open read-only")]
    ReadOnly,
    #[error("no message with UID {0}")]
    NoSuchMessage(u32),
    #[error("message could not be parsed: {0}")]
    Mime(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<mailparse::MailParseError> for StoreError {
    fn from(e: mailparse::MailParseError) -> Self {
        StoreError::Mime(e.to_string())
    }
}
