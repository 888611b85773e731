use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message may carry at most this many distinct emoji reaction entries.
pub const MAX_DISTINCT_REACTIONS: usize = 20;

/// A chat member and the role names they hold. Role names are unique per
/// member; a member may hold several roles at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub user_id: Uuid,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A role declared on a chat. `Owner`, `Admin` and `Moderator` are reserved
/// built-ins that never appear in `Chat::roles`; only custom roles do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_user_ids: Option<Vec<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_roles: Option<Vec<String>>,
    #[serde(default)]
    pub can_be_self_assigned: bool,
}

/// A chat room. Private chats have exactly two members and carry no roles or
/// channels; public chats always have an `Owner` member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub members: Vec<ChatMember>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Chat {
    pub fn member(&self, user_id: Uuid) -> Option<&ChatMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: Uuid) -> Option<&mut ChatMember> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.member(user_id).is_some()
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }
}

/// Access restrictions on a single channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPermissions {
    #[serde(default)]
    pub admins_only: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_users: Option<Vec<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_roles: Option<Vec<String>>,
}

/// A channel under a public chat. `order` defines the display sequence and is
/// reassigned as a batch by the reorder operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub order: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub permissions: ChannelPermissions,
}

/// One reaction entry on a message: a single emoji and the users who toggled
/// it on. The entry disappears once its user list empties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    pub sender: Uuid,
    pub text: String,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Online,
    Idle,
    Offline,
}

/// A pending private-chat deletion request, recorded on the requester and
/// keyed by the member who must confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequest {
    pub chat_id: Uuid,
    pub to: Uuid,
}

/// The mutable social state of a user, stored as a single document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub friends: Vec<Uuid>,
    #[serde(default)]
    pub pending_requests: Vec<Uuid>,
    #[serde(default)]
    pub banlist: Vec<Uuid>,
    #[serde(default)]
    pub deletion_requests: Vec<DeletionRequest>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    FriendDeclined,
    PrivateChatDeletionRequested,
    PrivateChatDeletionDeclined,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend-request",
            Self::FriendAccepted => "friend-accepted",
            Self::FriendDeclined => "friend-declined",
            Self::PrivateChatDeletionRequested => "private-chat-deletion-requested",
            Self::PrivateChatDeletionDeclined => "private-chat-deletion-declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "friend-request" => Some(Self::FriendRequest),
            "friend-accepted" => Some(Self::FriendAccepted),
            "friend-declined" => Some(Self::FriendDeclined),
            "private-chat-deletion-requested" => Some(Self::PrivateChatDeletionRequested),
            "private-chat-deletion-declined" => Some(Self::PrivateChatDeletionDeclined),
            _ => None,
        }
    }
}

/// An ephemeral recipient-owned record created by the social handlers and
/// deleted on accept/decline/dismissal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Uuid>,
    pub recipient: Uuid,
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
