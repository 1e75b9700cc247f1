//! Live-connection registry and notification fanout.
//!
//! One [`ClientConn`] exists per accepted socket. The registry maps
//! connection ids and authenticated user ids to connections so handlers can
//! target pushes at a meeting's audience, at all authenticated users, or at
//! one user. Pushes go through each connection's outbound channel; the
//! writer task owns the socket, so replies and pushes interleave in FIFO
//! order without two writers racing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use crate::model::{MeetingId, UserId};

/// Sentinel in the atomic id slots meaning "none". Safe because
/// [`crate::store::EntityStore`] guarantees allocated ids are positive.
const NONE: i64 = 0;

/// Shared handle for one live connection.
#[derive(Debug)]
pub struct ClientConn {
    /// Registry-unique id, assigned at accept time.
    pub id: u64,
    outbound: mpsc::UnboundedSender<String>,
    user_id: AtomicI64,
    meeting_id: AtomicI64,
}

impl ClientConn {
    /// Queues one line for the writer task. A closed channel means the
    /// connection is on its way out; the line is silently dropped.
    pub fn push(&self, line: String) {
        if self.outbound.send(line).is_err() {
            trace!(target: "parley_server::registry", conn_id = self.id, "push to closing connection dropped");
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.user_id.load(Ordering::Acquire) {
            NONE => None,
            id => Some(id),
        }
    }

    pub fn set_user_id(&self, user_id: Option<UserId>) {
        self.user_id.store(user_id.unwrap_or(NONE), Ordering::Release);
    }

    pub fn meeting_id(&self) -> Option<MeetingId> {
        match self.meeting_id.load(Ordering::Acquire) {
            NONE => None,
            id => Some(id),
        }
    }

    pub fn set_meeting_id(&self, meeting_id: Option<MeetingId>) {
        self.meeting_id
            .store(meeting_id.unwrap_or(NONE), Ordering::Release);
    }
}

/// Registry of live connections. Injected into every handler; nothing in the
/// server reaches for global state.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_conn_id: AtomicU64,
    connections: Mutex<HashMap<u64, Arc<ClientConn>>>,
    by_user: Mutex<HashMap<UserId, Arc<ClientConn>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<u64, Arc<ClientConn>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn by_user(&self) -> MutexGuard<'_, HashMap<UserId, Arc<ClientConn>>> {
        self.by_user.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection and hands back its outbound receiver for
    /// the writer task.
    pub fn register(&self) -> (Arc<ClientConn>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(ClientConn {
            id: self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1,
            outbound: tx,
            user_id: AtomicI64::new(NONE),
            meeting_id: AtomicI64::new(NONE),
        });
        self.connections().insert(conn.id, Arc::clone(&conn));
        (conn, rx)
    }

    /// Removes a connection. The user mapping is only cleared if it still
    /// points at this connection; a later login from elsewhere wins.
    pub fn unregister(&self, conn: &ClientConn) {
        self.connections().remove(&conn.id);
        if let Some(user_id) = conn.user_id() {
            let mut by_user = self.by_user();
            if by_user.get(&user_id).is_some_and(|c| c.id == conn.id) {
                by_user.remove(&user_id);
            }
        }
    }

    /// Binds a user to a connection after a successful login. A second login
    /// for the same user overwrites the mapping; the older connection keeps
    /// its socket but stops receiving user-targeted pushes.
    pub fn bind_user(&self, user_id: UserId, conn: &Arc<ClientConn>) {
        conn.set_user_id(Some(user_id));
        self.by_user().insert(user_id, Arc::clone(conn));
    }

    /// Clears the user binding on logout.
    pub fn unbind_user(&self, conn: &ClientConn) {
        if let Some(user_id) = conn.user_id() {
            let mut by_user = self.by_user();
            if by_user.get(&user_id).is_some_and(|c| c.id == conn.id) {
                by_user.remove(&user_id);
            }
        }
        conn.set_user_id(None);
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Sends `line` to every connection currently inside `meeting_id`.
    pub fn notify_meeting(&self, meeting_id: MeetingId, line: &str) {
        for conn in self.meeting_audience(meeting_id, None) {
            conn.push(line.to_string());
        }
    }

    /// Sends `line` to everyone inside the meeting except `skip_conn_id`.
    pub fn notify_meeting_except(&self, meeting_id: MeetingId, skip_conn_id: u64, line: &str) {
        for conn in self.meeting_audience(meeting_id, Some(skip_conn_id)) {
            conn.push(line.to_string());
        }
    }

    /// Sends `line` to every authenticated connection.
    pub fn notify_authenticated(&self, line: &str) {
        let targets: Vec<Arc<ClientConn>> = self
            .connections()
            .values()
            .filter(|c| c.user_id().is_some())
            .map(Arc::clone)
            .collect();
        for conn in targets {
            conn.push(line.to_string());
        }
    }

    /// Sends `line` to one user, if currently connected.
    pub fn notify_user(&self, user_id: UserId, line: &str) {
        let conn = self.by_user().get(&user_id).map(Arc::clone);
        if let Some(conn) = conn {
            conn.push(line.to_string());
        }
    }

    // Snapshot under the lock, push outside it.
    fn meeting_audience(
        &self,
        meeting_id: MeetingId,
        skip_conn_id: Option<u64>,
    ) -> Vec<Arc<ClientConn>> {
        self.connections()
            .values()
            .filter(|c| c.meeting_id() == Some(meeting_id) && Some(c.id) != skip_conn_id)
            .map(Arc::clone)
            .collect()
    }
}
