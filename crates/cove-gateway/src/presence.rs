use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::registry::SessionId;

/// Online accounting with multiple simultaneous sessions per user (tabs,
/// devices). A user counts as offline only once their session set empties;
/// the boolean edges returned by add/remove tell the caller whether to
/// broadcast a presence change.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    online: Arc<RwLock<HashMap<Uuid, HashSet<SessionId>>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true iff this is the user's first live session (came online).
    pub async fn add_session(&self, user_id: Uuid, session_id: SessionId) -> bool {
        let mut online = self.online.write().await;
        let sessions = online.entry(user_id).or_default();
        let was_offline = sessions.is_empty();
        sessions.insert(session_id);
        was_offline
    }

    /// Returns true iff this was the user's last session (went fully
    /// offline).
    pub async fn remove_session(&self, user_id: Uuid, session_id: SessionId) -> bool {
        let mut online = self.online.write().await;
        let Some(sessions) = online.get_mut(&user_id) else {
            return false;
        };
        sessions.remove(&session_id);
        if sessions.is_empty() {
            online.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.online.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.online.read().await.keys().copied().collect()
    }
}
