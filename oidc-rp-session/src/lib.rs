//! Session storage for in-flight logins.
//!
//! The handshake never owns session state; it receives a [`Session`] handle
//! that binds one [`SessionId`] to a pluggable [`SessionStore`].

mod id;
mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use id::SessionId;
pub use memory::InMemorySessionStore;

/// Boxed future returned by [`SessionStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Errors raised by a session backend.
#[derive(Debug)]
pub enum SessionError {
    /// The backend could not be reached or refused the operation.
    Backend(String),
    /// A stored value could not be encoded or decoded.
    Codec(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Backend(msg) => write!(f, "Session backend error: {msg}"),
            SessionError::Codec(msg) => write!(f, "Session value codec error: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Pluggable session backend.
///
/// Values are keyed first by session, then by a per-session key. Each
/// operation must be atomic for a given `(session, key)` pair; in particular
/// `pop` must hand a value to at most one caller.
///
/// Expiry is owned by the backend.
pub trait SessionStore: Send + Sync + 'static {
    /// Store `value` under `key`, replacing any previous value.
    fn put<'a>(&'a self, session: &'a SessionId, key: &'a str, value: String)
        -> StoreFuture<'a, ()>;

    /// Read the value under `key` without removing it.
    fn get<'a>(&'a self, session: &'a SessionId, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Read and remove the value under `key`.
    fn pop<'a>(&'a self, session: &'a SessionId, key: &'a str) -> StoreFuture<'a, Option<String>>;
}

/// A session identifier bound to the store that holds its values.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub async fn put(&self, key: &str, value: impl Into<String>) -> Result<(), SessionError> {
        self.store.put(&self.id, key, value.into()).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        self.store.get(&self.id, key).await
    }

    pub async fn pop(&self, key: &str) -> Result<Option<String>, SessionError> {
        self.store.pop(&self.id, key).await
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let encoded =
            serde_json::to_string(value).map_err(|e| SessionError::Codec(e.to_string()))?;
        self.put(key, encoded).await
    }

    /// Pop the value under `key` and decode it from JSON.
    ///
    /// The value is removed even when it fails to decode.
    pub async fn pop_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.pop(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SessionError::Codec(e.to_string())),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}
