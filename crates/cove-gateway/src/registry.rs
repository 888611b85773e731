use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use cove_types::events::ServerEvent;

pub type SessionId = Uuid;

/// A logical broadcast scope. Sessions join rooms to receive their events;
/// sessions not joined never see them — the room is the confidentiality
/// boundary for everything a chat fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// The whole chat: messages, channel changes, member/role deltas.
    Chat(Uuid),
    /// The "chatId:channelId" typing scope inside a chat.
    Channel { chat_id: Uuid, channel_id: Uuid },
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Chat(chat_id) => write!(f, "{chat_id}"),
            Room::Channel { chat_id, channel_id } => write!(f, "{chat_id}:{channel_id}"),
        }
    }
}

struct SessionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    /// room -> member sessions, with the reverse index kept in lockstep so a
    /// disconnect can clear a session out of every room it joined.
    rooms: RwLock<(HashMap<Room, HashSet<SessionId>>, HashMap<SessionId, HashSet<Room>>)>,
}

/// Maps connected sessions to the logical rooms they joined and delivers
/// events either room-scoped, session-scoped or user-scoped. Explicitly
/// constructed once per process and handed around by clone.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                rooms: RwLock::new((HashMap::new(), HashMap::new())),
            }),
        }
    }

    /// Register a connected session. Returns the receiver half the
    /// connection loop forwards to the socket.
    pub async fn register_session(
        &self,
        user_id: Uuid,
    ) -> (SessionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .sessions
            .write()
            .await
            .insert(session_id, SessionHandle { user_id, tx });
        (session_id, rx)
    }

    /// Drop a session from the registry and from every room it joined.
    pub async fn remove_session(&self, session_id: SessionId) {
        self.inner.sessions.write().await.remove(&session_id);
        let mut rooms = self.inner.rooms.write().await;
        if let Some(joined) = rooms.1.remove(&session_id) {
            for room in joined {
                if let Some(members) = rooms.0.get_mut(&room) {
                    members.remove(&session_id);
                    if members.is_empty() {
                        rooms.0.remove(&room);
                    }
                }
            }
        }
    }

    /// Idempotent join.
    pub async fn join(&self, session_id: SessionId, room: Room) {
        let mut rooms = self.inner.rooms.write().await;
        rooms.0.entry(room).or_default().insert(session_id);
        rooms.1.entry(session_id).or_default().insert(room);
    }

    /// Idempotent leave.
    pub async fn leave(&self, session_id: SessionId, room: Room) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.0.get_mut(&room) {
            members.remove(&session_id);
            if members.is_empty() {
                rooms.0.remove(&room);
            }
        }
        if let Some(joined) = rooms.1.get_mut(&session_id) {
            joined.remove(&room);
        }
    }

    pub async fn is_joined(&self, session_id: SessionId, room: Room) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .0
            .get(&room)
            .is_some_and(|members| members.contains(&session_id))
    }

    /// Deliver to every session currently in `room`.
    pub async fn broadcast(&self, room: Room, event: ServerEvent) {
        self.broadcast_inner(room, None, event).await;
    }

    /// Deliver to every session in `room` except `except` — used for relayed
    /// signals (typing) the originator does not need echoed back.
    pub async fn broadcast_except(&self, room: Room, except: SessionId, event: ServerEvent) {
        self.broadcast_inner(room, Some(except), event).await;
    }

    async fn broadcast_inner(&self, room: Room, except: Option<SessionId>, event: ServerEvent) {
        let members: Vec<SessionId> = {
            let rooms = self.inner.rooms.read().await;
            match rooms.0.get(&room) {
                Some(members) => members
                    .iter()
                    .copied()
                    .filter(|s| Some(*s) != except)
                    .collect(),
                None => return,
            }
        };
        let sessions = self.inner.sessions.read().await;
        for session_id in members {
            if let Some(handle) = sessions.get(&session_id) {
                let _ = handle.tx.send(event.clone());
            }
        }
    }

    /// Direct single-session delivery (request-scoped acks).
    pub async fn emit_to_session(&self, session_id: SessionId, event: ServerEvent) {
        let sessions = self.inner.sessions.read().await;
        if let Some(handle) = sessions.get(&session_id) {
            let _ = handle.tx.send(event);
        }
    }

    /// Deliver to every session of a user, whichever rooms they are in —
    /// notifications follow the user, not a room.
    pub async fn emit_to_user(&self, user_id: Uuid, event: ServerEvent) {
        let sessions = self.inner.sessions.read().await;
        for handle in sessions.values() {
            if handle.user_id == user_id {
                let _ = handle.tx.send(event.clone());
            }
        }
    }

    /// Deliver to every connected session (presence edges).
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let sessions = self.inner.sessions.read().await;
        for handle in sessions.values() {
            let _ = handle.tx.send(event.clone());
        }
    }

    /// Deliver to every connected session except those belonging to
    /// `user_id`. Status relays go to everyone else; the issuer already
    /// knows what they set.
    pub async fn broadcast_all_except(&self, user_id: Uuid, event: ServerEvent) {
        let sessions = self.inner.sessions.read().await;
        for handle in sessions.values() {
            if handle.user_id != user_id {
                let _ = handle.tx.send(event.clone());
            }
        }
    }
}
