use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::events::ServerEvent;
use cove_types::models::{Chat, ChatMember};
use cove_types::permissions::OWNER;

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, blocking, can, fetch_chat, has_builtin, require_member};

pub async fn create_chat(
    state: &GatewayState,
    ctx: &Ctx,
    name: String,
) -> Result<Value, HandlerError> {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(HandlerError::invalid("Chat name cannot be empty."));
    }

    let chat = Chat {
        id: Uuid::new_v4(),
        name,
        topic: None,
        thumbnail: None,
        is_private: false,
        members: vec![ChatMember {
            user_id: ctx.user_id,
            roles: vec![OWNER.to_owned()],
        }],
        roles: vec![],
    };

    {
        let chat = chat.clone();
        blocking(&state.db, move |db| db.insert_chat(&chat)).await?;
    }
    state.registry.join(ctx.session, Room::Chat(chat.id)).await;

    Ok(json!({ "chat": chat }))
}

/// Subscribe the session to a chat's event stream, or to a channel's typing
/// scope when a channel id is given. Membership is checked here so a socket
/// can never listen in on a chat it does not belong to.
pub async fn join_chat_room(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Option<Uuid>,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_member(&chat, ctx.user_id)?;

    let room = match channel_id {
        Some(channel_id) => {
            let channel = blocking(&state.db, move |db| db.get_channel(channel_id))
                .await?
                .filter(|c| c.chat_id == chat_id)
                .ok_or_else(|| HandlerError::not_found("Channel is not found."))?;
            Room::Channel { chat_id, channel_id: channel.id }
        }
        None => Room::Chat(chat_id),
    };
    state.registry.join(ctx.session, room).await;

    Ok(json!({}))
}

pub async fn leave_chat_room(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Option<Uuid>,
) -> Result<Value, HandlerError> {
    let room = match channel_id {
        Some(channel_id) => Room::Channel { chat_id, channel_id },
        None => Room::Chat(chat_id),
    };
    state.registry.leave(ctx.session, room).await;
    Ok(json!({}))
}

/// Lazy, idempotent creation of the single private chat between two users.
/// Reopening returns the existing chat instead of creating a second one.
pub async fn open_private_chat(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    if user_id == ctx.user_id {
        return Err(HandlerError::invalid(
            "You cannot open a private chat with yourself.",
        ));
    }

    let me = ctx.user_id;
    let other_profile = blocking(&state.db, move |db| db.get_profile(user_id))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))?;
    let my_profile = blocking(&state.db, move |db| db.get_profile(me))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))?;

    if my_profile.banlist.contains(&user_id) || other_profile.banlist.contains(&me) {
        return Err(HandlerError::forbidden("You cannot message this user."));
    }

    if let Some(existing) = blocking(&state.db, move |db| db.find_private_chat(me, user_id)).await?
    {
        state.registry.join(ctx.session, Room::Chat(existing.id)).await;
        return Ok(json!({ "chat": existing }));
    }

    let chat = Chat {
        id: Uuid::new_v4(),
        name: String::new(),
        topic: None,
        thumbnail: None,
        is_private: true,
        members: vec![
            ChatMember { user_id: me, roles: vec![] },
            ChatMember { user_id, roles: vec![] },
        ],
        roles: vec![],
    };
    {
        let chat = chat.clone();
        blocking(&state.db, move |db| db.insert_chat(&chat)).await?;
    }
    state.registry.join(ctx.session, Room::Chat(chat.id)).await;

    Ok(json!({ "chat": chat }))
}

pub async fn delete_chat(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    let member = require_member(&chat, ctx.user_id)?;

    if chat.is_private {
        return Err(HandlerError::invalid(
            "Private chats are deleted by mutual consent.",
        ));
    }
    if !has_builtin(member, OWNER) && !can(&chat, member, "canDeleteChatroom") {
        return Err(HandlerError::forbidden(
            "Only the owner can delete this chat.",
        ));
    }

    blocking(&state.db, move |db| db.delete_chat(chat_id)).await?;
    state
        .registry
        .broadcast(Room::Chat(chat_id), ServerEvent::ChatDeleted { chat_id })
        .await;

    Ok(json!({}))
}
