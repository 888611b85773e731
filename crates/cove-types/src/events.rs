use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Channel, ChannelPermissions, Chat, ChatMember, Message, Notification, Reaction, Role,
    UserStatus,
};

/// One inbound frame: a command plus an optional client-chosen sequence
/// number, echoed back in the ack so the client can correlate responses.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFrame {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Commands sent FROM client TO server over the gateway. One variant per
/// mutating or signalling event; payload fields are validated here at the
/// boundary before any handler runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    // -- Rooms / chats --
    JoinChatRoom {
        chat_id: Uuid,
        #[serde(default)]
        channel_id: Option<Uuid>,
    },
    LeaveChatRoom {
        chat_id: Uuid,
        #[serde(default)]
        channel_id: Option<Uuid>,
    },
    CreateChat {
        name: String,
    },
    DeleteChat {
        chat_id: Uuid,
    },
    OpenPrivateChat {
        user_id: Uuid,
    },

    // -- Channels --
    AddChannel {
        chat_id: Uuid,
        channel_name: String,
    },
    RenameChannel {
        chat_id: Uuid,
        channel_id: Uuid,
        name: String,
    },
    EditChannelTopic {
        chat_id: Uuid,
        channel_id: Uuid,
        topic: String,
    },
    UpdateChannelPermissions {
        chat_id: Uuid,
        channel_id: Uuid,
        permissions: ChannelPermissions,
    },
    DeleteChannel {
        chat_id: Uuid,
        channel_id: Uuid,
    },
    ChangeChannelOrder {
        chat_id: Uuid,
        channel_ids: Vec<Uuid>,
    },

    // -- Roles --
    CreateRole {
        chat_id: Uuid,
        role: Role,
    },
    EditRole {
        chat_id: Uuid,
        role: Role,
    },
    AssignRole {
        chat_id: Uuid,
        user_id: Uuid,
        role: String,
    },
    RemoveRole {
        chat_id: Uuid,
        user_id: Uuid,
        role: String,
    },

    // -- Messages --
    Message {
        chat_id: Uuid,
        channel_id: Uuid,
        message: String,
    },
    PrivateMessage {
        chat_id: Uuid,
        message: String,
    },
    EditMessage {
        chat_id: Uuid,
        message_id: Uuid,
        text: String,
    },
    DeleteMessage {
        chat_id: Uuid,
        message_id: Uuid,
    },
    Reply {
        chat_id: Uuid,
        message_id: Uuid,
        text: String,
    },
    PrivateReply {
        chat_id: Uuid,
        message_id: Uuid,
        text: String,
    },
    ToggleReaction {
        chat_id: Uuid,
        message_id: Uuid,
        reaction: String,
    },

    // -- Activity --
    TypingStart {
        chat_id: Uuid,
        channel_id: Uuid,
    },
    TypingStop {
        chat_id: Uuid,
        channel_id: Uuid,
    },
    EditStatus {
        status: UserStatus,
    },

    // -- Social --
    SendFriendRequest {
        user_id: Uuid,
    },
    AcceptFriendRequest {
        user_id: Uuid,
    },
    DeclineFriendRequest {
        user_id: Uuid,
    },
    RemoveFriend {
        user_id: Uuid,
    },
    BanUser {
        user_id: Uuid,
    },
    UnbanUser {
        user_id: Uuid,
    },
    DeletePrivateChatRequest {
        chat_id: Uuid,
    },
    ConfirmDeletePrivateChat {
        chat_id: Uuid,
    },
    DeclinePrivateChatDeletion {
        chat_id: Uuid,
    },
}

impl ClientCommand {
    /// Stable operation name, used for logging and for the generic internal
    /// error message shown to clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChatRoom { .. } => "joinChatRoom",
            Self::LeaveChatRoom { .. } => "leaveChatRoom",
            Self::CreateChat { .. } => "createChat",
            Self::DeleteChat { .. } => "deleteChat",
            Self::OpenPrivateChat { .. } => "openPrivateChat",
            Self::AddChannel { .. } => "addChannel",
            Self::RenameChannel { .. } => "renameChannel",
            Self::EditChannelTopic { .. } => "editChannelTopic",
            Self::UpdateChannelPermissions { .. } => "updateChannelPermissions",
            Self::DeleteChannel { .. } => "deleteChannel",
            Self::ChangeChannelOrder { .. } => "changeChannelOrder",
            Self::CreateRole { .. } => "createRole",
            Self::EditRole { .. } => "editRole",
            Self::AssignRole { .. } => "assignRole",
            Self::RemoveRole { .. } => "removeRole",
            Self::Message { .. } => "message",
            Self::PrivateMessage { .. } => "privateMessage",
            Self::EditMessage { .. } => "editMessage",
            Self::DeleteMessage { .. } => "deleteMessage",
            Self::Reply { .. } => "reply",
            Self::PrivateReply { .. } => "privateReply",
            Self::ToggleReaction { .. } => "toggleReaction",
            Self::TypingStart { .. } => "typingStart",
            Self::TypingStop { .. } => "typingStop",
            Self::EditStatus { .. } => "editStatus",
            Self::SendFriendRequest { .. } => "sendFriendRequest",
            Self::AcceptFriendRequest { .. } => "acceptFriendRequest",
            Self::DeclineFriendRequest { .. } => "declineFriendRequest",
            Self::RemoveFriend { .. } => "removeFriend",
            Self::BanUser { .. } => "banUser",
            Self::UnbanUser { .. } => "unbanUser",
            Self::DeletePrivateChatRequest { .. } => "deletePrivateChatRequest",
            Self::ConfirmDeletePrivateChat { .. } => "confirmDeletePrivateChat",
            Self::DeclinePrivateChatDeletion { .. } => "declinePrivateChatDeletion",
        }
    }
}

/// Result half of an ack: `{success: true, …}` on the happy path or
/// `{error: "…"}` on rejection. Every handled command produces exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckResult {
    Success {
        success: bool,
        #[serde(flatten)]
        data: serde_json::Map<String, serde_json::Value>,
    },
    Failure {
        error: String,
    },
}

impl AckResult {
    pub fn ok() -> Self {
        Self::Success {
            success: true,
            data: serde_json::Map::new(),
        }
    }

    /// Success with extra fields; `data` must serialize to a JSON object.
    pub fn ok_with(data: serde_json::Value) -> Self {
        let map = match data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        Self::Success { success: true, data: map }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Failure {
            error: message.into(),
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Events sent FROM server TO clients over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Server confirms successful authentication.
    Ready { user_id: Uuid, username: String },

    /// Per-command acknowledgement, delivered only to the requester.
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(flatten)]
        result: AckResult,
    },

    // -- Channels --
    ChannelAdded { chat_id: Uuid, channel: Channel },
    ChannelEdited { chat_id: Uuid, channel: Channel },
    ChannelDeleted { chat_id: Uuid, channel_id: Uuid },
    ChannelsUpdated { chat_id: Uuid, channels: Vec<Channel> },

    // -- Messages --
    Message { chat_id: Uuid, message: Message },
    MessageEdited { chat_id: Uuid, message: Message },
    MessageDeleted {
        chat_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel_id: Option<Uuid>,
        message_id: Uuid,
    },
    /// Bulk deletion, broadcast when a channel cascade removes its messages.
    MessagesDeleted { chat_id: Uuid, channel_id: Uuid },
    MessageReplied { chat_id: Uuid, message: Message },
    ReactionToggled {
        chat_id: Uuid,
        message_id: Uuid,
        reactions: Vec<Reaction>,
    },

    // -- Chat state --
    MemberUpdated { chat_id: Uuid, member: ChatMember },
    ChatUpdated { chat: Chat },
    ChatDeleted { chat_id: Uuid },

    // -- Notifications --
    Notification { notification: Notification },
    NotificationDeleted { notification_id: Uuid },

    // -- Activity / presence --
    UserTypingStart {
        chat_id: Uuid,
        channel_id: Uuid,
        user_id: Uuid,
        username: String,
    },
    UserTypingStop {
        chat_id: Uuid,
        channel_id: Uuid,
        user_id: Uuid,
        username: String,
    },
    UserIdle { user_id: Uuid },
    UserActive { user_id: Uuid },
    UserOnline { user_id: Uuid, username: String },
    UserOffline { user_id: Uuid },
}
