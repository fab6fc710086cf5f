//! services/api/src/web/session.rs
//!
//! Browser sessions. Every signed-in browser owns one `AuthGate`, found
//! through the opaque id carried in the `session` cookie. A session expires
//! after its TTL by feeding a `SignedOut` event to its gate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use futures::Stream;
use memoria_core::{AuthGate, SessionEvent};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

struct SessionEntry {
    gate: Arc<AuthGate>,
    /// Cancels the pending expiry when the session ends early.
    expiry: CancellationToken,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Registers a signed-in gate and returns the new session id.
    pub async fn create(&self, gate: Arc<AuthGate>) -> Uuid {
        let id = Uuid::new_v4();
        let expiry = CancellationToken::new();
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                gate: gate.clone(),
                expiry: expiry.clone(),
            },
        );

        let store = self.clone();
        let events = expiry_events(self.ttl, expiry);
        tokio::spawn(async move {
            gate.run(events).await;
            if store.sessions.write().await.remove(&id).is_some() {
                info!(session = %id, "Session expired");
            }
        });
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<AuthGate>> {
        self.sessions.read().await.get(id).map(|e| e.gate.clone())
    }

    /// Forgets a session and stops its expiry timer.
    pub async fn remove(&self, id: &Uuid) -> Option<Arc<AuthGate>> {
        let entry = self.sessions.write().await.remove(id)?;
        entry.expiry.cancel();
        debug!(session = %id, "Session removed");
        Some(entry.gate)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Yields `SignedOut` once `ttl` has elapsed, unless cancelled first.
fn expiry_events(ttl: Duration, cancel: CancellationToken) -> impl Stream<Item = SessionEvent> {
    async_stream::stream! {
        let expired = tokio::select! {
            _ = tokio::time::sleep(ttl) => true,
            _ = cancel.cancelled() => false,
        };
        if expired {
            yield SessionEvent::SignedOut;
        }
    }
}

/// The session id in the request's `session` cookie, if any.
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| c.trim().strip_prefix("session="))
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

pub fn session_cookie(id: Uuid, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        id,
        ttl.as_secs()
    )
}

pub fn cleared_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}
