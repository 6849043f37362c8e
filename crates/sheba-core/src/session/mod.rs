//! Session lifecycle: the in-memory session, its state machine and its
//! persisted copy.

pub mod manager;
pub mod store;

pub use manager::{
    LoginOutcome, PasswordChangeOutcome, Session, SessionError, SessionHandle, SessionManager,
    SessionStatus,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistedRecord, SessionStore, StoredSession};
