use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::{SessionId, SessionStore, StoreFuture};

struct SessionEntry {
    values: HashMap<String, String>,
    touched: Instant,
}

/// In-memory session store backed by `DashMap`.
///
/// A session expires `ttl` after its last write and is lazily evicted on
/// access. Reads do not extend the lifetime. Writes sweep out every expired
/// session at most once per `ttl`, and a session emptied by `pop` is dropped.
#[derive(Clone)]
pub struct InMemorySessionStore {
    inner: Arc<DashMap<String, SessionEntry>>,
    ttl: Duration,
    epoch: Instant,
    /// Milliseconds since `epoch` at the last sweep.
    last_sweep: Arc<AtomicU64>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            epoch: Instant::now(),
            last_sweep: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of sessions currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove all expired sessions.
    pub fn evict_expired(&self) {
        let ttl = self.ttl;
        self.inner.retain(|_, entry| entry.touched.elapsed() < ttl);
    }

    fn sweep_if_due(&self) {
        let now = millis(self.epoch.elapsed());
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < millis(self.ttl) {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let before = self.inner.len();
            self.evict_expired();
            let evicted = before.saturating_sub(self.inner.len());
            tracing::debug!(evicted, "Swept expired sessions");
        }
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        entry.touched.elapsed() >= self.ttl
    }

    fn remove_if_expired(&self, session: &SessionId) {
        let ttl = self.ttl;
        if self
            .inner
            .remove_if(session.as_str(), |_, entry| entry.touched.elapsed() >= ttl)
            .is_some()
        {
            tracing::debug!(session = ?session, "Evicted expired session");
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn put<'a>(
        &'a self,
        session: &'a SessionId,
        key: &'a str,
        value: String,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sweep_if_due();
            let now = Instant::now();
            let mut entry = self
                .inner
                .entry(session.as_str().to_string())
                .or_insert_with(|| SessionEntry {
                    values: HashMap::new(),
                    touched: now,
                });
            if self.is_expired(&entry) {
                entry.values.clear();
            }
            entry.values.insert(key.to_string(), value);
            entry.touched = now;
            Ok(())
        })
    }

    fn get<'a>(&'a self, session: &'a SessionId, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut expired = false;
            let value = match self.inner.get(session.as_str()) {
                Some(entry) if self.is_expired(&entry) => {
                    expired = true;
                    None
                }
                Some(entry) => entry.values.get(key).cloned(),
                None => None,
            };
            if expired {
                self.remove_if_expired(session);
            }
            Ok(value)
        })
    }

    fn pop<'a>(&'a self, session: &'a SessionId, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut expired = false;
            let mut emptied = false;
            let value = match self.inner.get_mut(session.as_str()) {
                Some(entry) if self.is_expired(&entry) => {
                    expired = true;
                    None
                }
                Some(mut entry) => {
                    let value = entry.values.remove(key);
                    emptied = entry.values.is_empty();
                    value
                }
                None => None,
            };
            if expired {
                self.remove_if_expired(session);
            } else if emptied {
                // A concurrent put may have refilled it in between.
                self.inner
                    .remove_if(session.as_str(), |_, entry| entry.values.is_empty());
            }
            Ok(value)
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
