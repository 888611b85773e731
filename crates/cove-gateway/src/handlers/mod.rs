pub mod activity;
pub mod channels;
pub mod chats;
pub mod messages;
pub mod roles;
pub mod social;

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use cove_db::Database;
use cove_types::events::{AckResult, ClientCommand, CommandFrame, ServerEvent};
use cove_types::models::{Chat, ChatMember};
use cove_types::permissions::{
    self, ADMIN, ADMIN_RANK, MODERATOR, MODERATOR_RANK, OWNER, OWNER_RANK,
};

use crate::error::HandlerError;
use crate::registry::SessionId;
use crate::state::GatewayState;

/// Identity resolved at connect time and attached to the session for the
/// lifetime of the connection.
#[derive(Clone)]
pub struct Ctx {
    pub session: SessionId,
    pub user_id: Uuid,
    pub username: String,
}

/// Entry point for one inbound frame: route to the handler, then resolve
/// exactly one ack back to the requester — success or error, never both,
/// never an uncaught failure.
pub async fn handle_frame(state: &GatewayState, ctx: &Ctx, frame: CommandFrame) {
    let op = frame.command.name();
    let result = match route(state, ctx, frame.command).await {
        Ok(data) => AckResult::ok_with(data),
        Err(err) => AckResult::err(err.client_message(op)),
    };
    if result.is_err() {
        debug!("{} ({}) {op} rejected", ctx.username, ctx.user_id);
    }
    state
        .registry
        .emit_to_session(
            ctx.session,
            ServerEvent::Ack {
                seq: frame.seq,
                result,
            },
        )
        .await;
}

async fn route(
    state: &GatewayState,
    ctx: &Ctx,
    command: ClientCommand,
) -> Result<Value, HandlerError> {
    use ClientCommand::*;

    match command {
        JoinChatRoom { chat_id, channel_id } => {
            chats::join_chat_room(state, ctx, chat_id, channel_id).await
        }
        LeaveChatRoom { chat_id, channel_id } => {
            chats::leave_chat_room(state, ctx, chat_id, channel_id).await
        }
        CreateChat { name } => chats::create_chat(state, ctx, name).await,
        DeleteChat { chat_id } => chats::delete_chat(state, ctx, chat_id).await,
        OpenPrivateChat { user_id } => chats::open_private_chat(state, ctx, user_id).await,

        AddChannel { chat_id, channel_name } => {
            channels::add_channel(state, ctx, chat_id, channel_name).await
        }
        RenameChannel { chat_id, channel_id, name } => {
            channels::rename_channel(state, ctx, chat_id, channel_id, name).await
        }
        EditChannelTopic { chat_id, channel_id, topic } => {
            channels::edit_channel_topic(state, ctx, chat_id, channel_id, topic).await
        }
        UpdateChannelPermissions { chat_id, channel_id, permissions } => {
            channels::update_channel_permissions(state, ctx, chat_id, channel_id, permissions)
                .await
        }
        DeleteChannel { chat_id, channel_id } => {
            channels::delete_channel(state, ctx, chat_id, channel_id).await
        }
        ChangeChannelOrder { chat_id, channel_ids } => {
            channels::change_channel_order(state, ctx, chat_id, channel_ids).await
        }

        CreateRole { chat_id, role } => roles::create_role(state, ctx, chat_id, role).await,
        EditRole { chat_id, role } => roles::edit_role(state, ctx, chat_id, role).await,
        AssignRole { chat_id, user_id, role } => {
            roles::assign_role(state, ctx, chat_id, user_id, role).await
        }
        RemoveRole { chat_id, user_id, role } => {
            roles::remove_role(state, ctx, chat_id, user_id, role).await
        }

        Message { chat_id, channel_id, message } => {
            messages::send_message(state, ctx, chat_id, channel_id, message).await
        }
        PrivateMessage { chat_id, message } => {
            messages::private_message(state, ctx, chat_id, message).await
        }
        EditMessage { chat_id, message_id, text } => {
            messages::edit_message(state, ctx, chat_id, message_id, text).await
        }
        DeleteMessage { chat_id, message_id } => {
            messages::delete_message(state, ctx, chat_id, message_id).await
        }
        Reply { chat_id, message_id, text } => {
            messages::reply(state, ctx, chat_id, message_id, text).await
        }
        PrivateReply { chat_id, message_id, text } => {
            messages::private_reply(state, ctx, chat_id, message_id, text).await
        }
        ToggleReaction { chat_id, message_id, reaction } => {
            messages::toggle_reaction(state, ctx, chat_id, message_id, reaction).await
        }

        TypingStart { chat_id, channel_id } => {
            activity::typing(state, ctx, chat_id, channel_id, true).await
        }
        TypingStop { chat_id, channel_id } => {
            activity::typing(state, ctx, chat_id, channel_id, false).await
        }
        EditStatus { status } => activity::edit_status(state, ctx, status).await,

        SendFriendRequest { user_id } => social::send_friend_request(state, ctx, user_id).await,
        AcceptFriendRequest { user_id } => {
            social::accept_friend_request(state, ctx, user_id).await
        }
        DeclineFriendRequest { user_id } => {
            social::decline_friend_request(state, ctx, user_id).await
        }
        RemoveFriend { user_id } => social::remove_friend(state, ctx, user_id).await,
        BanUser { user_id } => social::ban_user(state, ctx, user_id).await,
        UnbanUser { user_id } => social::unban_user(state, ctx, user_id).await,
        DeletePrivateChatRequest { chat_id } => {
            social::delete_private_chat_request(state, ctx, chat_id).await
        }
        ConfirmDeletePrivateChat { chat_id } => {
            social::confirm_delete_private_chat(state, ctx, chat_id).await
        }
        DeclinePrivateChatDeletion { chat_id } => {
            social::decline_private_chat_deletion(state, ctx, chat_id).await
        }
    }
}

/// Run a blocking database closure off the async runtime.
pub(crate) async fn blocking<T, F>(db: &Arc<Database>, f: F) -> Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| HandlerError::Internal(anyhow!("spawn_blocking join error: {e}")))?
        .map_err(HandlerError::Internal)
}

pub(crate) async fn fetch_chat(
    state: &GatewayState,
    chat_id: Uuid,
) -> Result<(Chat, i64), HandlerError> {
    blocking(&state.db, move |db| db.get_chat(chat_id))
        .await?
        .ok_or_else(|| HandlerError::not_found("Chat is not found."))
}

pub(crate) fn require_member(chat: &Chat, user_id: Uuid) -> Result<&ChatMember, HandlerError> {
    chat.member(user_id)
        .ok_or_else(|| HandlerError::forbidden("You are not a member of this chat."))
}

pub(crate) fn has_builtin(member: &ChatMember, role: &str) -> bool {
    member.roles.iter().any(|r| r == role)
}

/// Rank of a member for assignment ordering: built-ins sit above every
/// custom role, custom roles rank by their strongest permission. The
/// authorization state is read fresh from the chat document on every event,
/// never cached. Authoring new roles uses a tighter cap in `roles`.
pub(crate) fn member_rank(chat: &Chat, member: &ChatMember) -> u8 {
    member
        .roles
        .iter()
        .map(|name| match name.as_str() {
            OWNER => OWNER_RANK,
            ADMIN => ADMIN_RANK,
            MODERATOR => MODERATOR_RANK,
            custom => chat
                .role(custom)
                .map(|r| permissions::rank(r.permissions.iter().map(String::as_str)))
                .unwrap_or(0),
        })
        .max()
        .unwrap_or(0)
}

/// Whether a member may perform an action gated on `permission`: Owner and
/// Admin always may, otherwise a custom role must grant it explicitly.
pub(crate) fn can(chat: &Chat, member: &ChatMember, permission: &str) -> bool {
    if has_builtin(member, OWNER) || has_builtin(member, ADMIN) {
        return true;
    }
    member.roles.iter().any(|name| {
        chat.role(name)
            .is_some_and(|r| r.permissions.iter().any(|p| p == permission))
    })
}

/// The privilege bar for role administration: any built-in role, or a custom
/// role granting canAssignRoles.
pub(crate) fn is_privileged(chat: &Chat, member: &ChatMember) -> bool {
    has_builtin(member, OWNER)
        || has_builtin(member, ADMIN)
        || has_builtin(member, MODERATOR)
        || can(chat, member, "canAssignRoles")
}

const MAX_SAVE_RETRIES: usize = 3;

/// Re-fetch / apply / conditionally-save loop for chat-document mutations.
/// The closure runs against a fresh read on every attempt, so both the
/// validation and the mutation see current state; a version conflict from a
/// concurrent editor retries instead of silently overwriting.
pub(crate) async fn update_chat<T, F>(
    state: &GatewayState,
    chat_id: Uuid,
    mut apply: F,
) -> Result<(Chat, T), HandlerError>
where
    T: Send + 'static,
    F: FnMut(&mut Chat) -> Result<T, HandlerError>,
{
    for _ in 0..MAX_SAVE_RETRIES {
        let (mut chat, version) = fetch_chat(state, chat_id).await?;
        let value = apply(&mut chat)?;
        let saved = {
            let chat = chat.clone();
            blocking(&state.db, move |db| db.save_chat(&chat, version)).await?
        };
        if saved {
            return Ok((chat, value));
        }
    }
    Err(HandlerError::Internal(anyhow!(
        "persistent version conflict updating chat {chat_id}"
    )))
}
