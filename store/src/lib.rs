//! The Store Interface (spec.md §4.E / §5): the trait boundary between the
//! gateway's session logic and whatever object store actually holds mail,
//! plus an in-memory reference implementation for tests.

pub mod error;
pub mod mem;
pub mod mime;
pub mod store;
pub mod types;

pub use error::{AuthError, StoreError};
pub use store::{Authenticator, Folder, FolderCounters, Protocol, Store};
pub use types::{Address, BodyStructure, Envelope, FolderInfo, MessageMeta, Namespace};
