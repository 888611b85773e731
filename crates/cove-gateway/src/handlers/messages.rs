use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::emoji::is_single_emoji;
use cove_types::events::ServerEvent;
use cove_types::models::{
    Channel, Chat, ChatMember, MAX_DISTINCT_REACTIONS, Message, Reaction,
};
use cove_types::permissions::{ADMIN, MODERATOR, OWNER};

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, blocking, can, fetch_chat, has_builtin, require_member};

fn validate_text(text: &str) -> Result<String, HandlerError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(HandlerError::invalid("Message cannot be empty."));
    }
    Ok(text.to_owned())
}

async fn fetch_message(
    state: &GatewayState,
    chat_id: Uuid,
    message_id: Uuid,
) -> Result<Message, HandlerError> {
    blocking(&state.db, move |db| db.get_message(message_id))
        .await?
        .filter(|m| m.chat_id == chat_id)
        .ok_or_else(|| HandlerError::not_found("Message is not found."))
}

/// Channel-level posting gates. Owner and Admin bypass every restriction;
/// everyone else is checked against adminsOnly, readOnly and the allow-lists.
fn check_channel_posting(channel: &Channel, member: &ChatMember) -> Result<(), HandlerError> {
    let bypass = has_builtin(member, OWNER) || has_builtin(member, ADMIN);
    if bypass {
        return Ok(());
    }
    let perms = &channel.permissions;
    if perms.admins_only {
        return Err(HandlerError::forbidden(
            "This channel is restricted to admins.",
        ));
    }
    if perms.read_only {
        return Err(HandlerError::forbidden("This channel is read-only."));
    }
    if perms.allowed_users.is_some() || perms.allowed_roles.is_some() {
        let by_user = perms
            .allowed_users
            .as_ref()
            .is_some_and(|users| users.contains(&member.user_id));
        let by_role = perms.allowed_roles.as_ref().is_some_and(|roles| {
            member.roles.iter().any(|r| roles.contains(r))
        });
        if !by_user && !by_role {
            return Err(HandlerError::forbidden(
                "You cannot post in this channel.",
            ));
        }
    }
    Ok(())
}

async fn store_and_broadcast(
    state: &GatewayState,
    message: Message,
    event: fn(Uuid, Message) -> ServerEvent,
) -> Result<Value, HandlerError> {
    {
        let message = message.clone();
        blocking(&state.db, move |db| db.insert_message(&message)).await?;
    }
    state
        .registry
        .broadcast(
            Room::Chat(message.chat_id),
            event(message.chat_id, message.clone()),
        )
        .await;
    Ok(json!({ "message": message }))
}

pub async fn send_message(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    text: String,
) -> Result<Value, HandlerError> {
    let text = validate_text(&text)?;
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if chat.is_private {
        return Err(HandlerError::invalid("Use privateMessage in private chats."));
    }
    let member = require_member(&chat, ctx.user_id)?;

    let channel = blocking(&state.db, move |db| db.get_channel(channel_id))
        .await?
        .filter(|c| c.chat_id == chat_id)
        .ok_or_else(|| HandlerError::not_found("Channel is not found."))?;
    check_channel_posting(&channel, member)?;

    let message = Message {
        id: Uuid::new_v4(),
        chat_id,
        channel_id: Some(channel.id),
        sender: ctx.user_id,
        text,
        is_edited: false,
        reply_to: None,
        reactions: vec![],
        created_at: Utc::now(),
    };
    store_and_broadcast(state, message, |chat_id, message| ServerEvent::Message {
        chat_id,
        message,
    })
    .await
}

pub async fn private_message(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    text: String,
) -> Result<Value, HandlerError> {
    let text = validate_text(&text)?;
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if !chat.is_private {
        return Err(HandlerError::invalid("Use message in public chats."));
    }
    require_member(&chat, ctx.user_id)?;
    check_private_counterpart(state, &chat, ctx.user_id).await?;

    let message = Message {
        id: Uuid::new_v4(),
        chat_id,
        channel_id: None,
        sender: ctx.user_id,
        text,
        is_edited: false,
        reply_to: None,
        reactions: vec![],
        created_at: Utc::now(),
    };
    store_and_broadcast(state, message, |chat_id, message| ServerEvent::Message {
        chat_id,
        message,
    })
    .await
}

/// A ban in either direction closes the private channel without deleting it.
async fn check_private_counterpart(
    state: &GatewayState,
    chat: &Chat,
    sender: Uuid,
) -> Result<(), HandlerError> {
    let Some(other) = chat.members.iter().map(|m| m.user_id).find(|id| *id != sender)
    else {
        return Ok(());
    };
    let mine = blocking(&state.db, move |db| db.get_profile(sender))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))?;
    let theirs = blocking(&state.db, move |db| db.get_profile(other))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))?;
    if mine.banlist.contains(&other) || theirs.banlist.contains(&sender) {
        return Err(HandlerError::forbidden("You cannot message this user."));
    }
    Ok(())
}

pub async fn edit_message(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    message_id: Uuid,
    text: String,
) -> Result<Value, HandlerError> {
    let text = validate_text(&text)?;
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_member(&chat, ctx.user_id)?;

    let mut message = fetch_message(state, chat_id, message_id).await?;
    if message.sender != ctx.user_id {
        return Err(HandlerError::forbidden(
            "You can only edit your own messages.",
        ));
    }

    {
        let text = text.clone();
        blocking(&state.db, move |db| db.update_message_text(message_id, &text)).await?;
    }
    message.text = text;
    message.is_edited = true;

    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::MessageEdited { chat_id, message: message.clone() },
        )
        .await;

    Ok(json!({ "message": message }))
}

pub async fn delete_message(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    message_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    let member = require_member(&chat, ctx.user_id)?;
    let message = fetch_message(state, chat_id, message_id).await?;

    let moderates = !chat.is_private
        && (has_builtin(member, MODERATOR) || can(&chat, member, "canDeleteMessages"));
    if message.sender != ctx.user_id && !moderates {
        return Err(HandlerError::forbidden("You cannot delete this message."));
    }

    blocking(&state.db, move |db| db.delete_message(message_id)).await?;
    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::MessageDeleted {
                chat_id,
                channel_id: message.channel_id,
                message_id,
            },
        )
        .await;

    Ok(json!({}))
}

pub async fn reply(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    message_id: Uuid,
    text: String,
) -> Result<Value, HandlerError> {
    let text = validate_text(&text)?;
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if chat.is_private {
        return Err(HandlerError::invalid("Use privateReply in private chats."));
    }
    let member = require_member(&chat, ctx.user_id)?;

    let target = fetch_message(state, chat_id, message_id).await?;
    if target.sender == ctx.user_id {
        return Err(HandlerError::invalid(
            "You cannot reply to your own message.",
        ));
    }
    if let Some(channel_id) = target.channel_id {
        let channel = blocking(&state.db, move |db| db.get_channel(channel_id))
            .await?
            .filter(|c| c.chat_id == chat_id)
            .ok_or_else(|| HandlerError::not_found("Channel is not found."))?;
        check_channel_posting(&channel, member)?;
    }

    let message = Message {
        id: Uuid::new_v4(),
        chat_id,
        channel_id: target.channel_id,
        sender: ctx.user_id,
        text,
        is_edited: false,
        reply_to: Some(target.id),
        reactions: vec![],
        created_at: Utc::now(),
    };
    store_and_broadcast(state, message, |chat_id, message| {
        ServerEvent::MessageReplied { chat_id, message }
    })
    .await
}

pub async fn private_reply(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    message_id: Uuid,
    text: String,
) -> Result<Value, HandlerError> {
    let text = validate_text(&text)?;
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if !chat.is_private {
        return Err(HandlerError::invalid("Use reply in public chats."));
    }
    require_member(&chat, ctx.user_id)?;
    check_private_counterpart(state, &chat, ctx.user_id).await?;

    let target = fetch_message(state, chat_id, message_id).await?;
    if target.sender == ctx.user_id {
        return Err(HandlerError::invalid(
            "You cannot reply to your own message.",
        ));
    }

    let message = Message {
        id: Uuid::new_v4(),
        chat_id,
        channel_id: None,
        sender: ctx.user_id,
        text,
        is_edited: false,
        reply_to: Some(target.id),
        reactions: vec![],
        created_at: Utc::now(),
    };
    store_and_broadcast(state, message, |chat_id, message| {
        ServerEvent::MessageReplied { chat_id, message }
    })
    .await
}

pub async fn toggle_reaction(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    message_id: Uuid,
    reaction: String,
) -> Result<Value, HandlerError> {
    if !is_single_emoji(&reaction) {
        return Err(HandlerError::invalid("Reaction must be a single emoji."));
    }
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_member(&chat, ctx.user_id)?;

    let mut message = fetch_message(state, chat_id, message_id).await?;
    toggle(&mut message.reactions, &reaction, ctx.user_id)?;

    {
        let reactions = message.reactions.clone();
        blocking(&state.db, move |db| {
            db.update_message_reactions(message_id, &reactions)
        })
        .await?;
    }
    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::ReactionToggled {
                chat_id,
                message_id,
                reactions: message.reactions.clone(),
            },
        )
        .await;

    Ok(json!({ "reactions": message.reactions }))
}

/// Add the user to the emoji's entry, or take them off it; an entry with no
/// users left disappears. New entries are capped at the distinct-emoji limit.
fn toggle(reactions: &mut Vec<Reaction>, emoji: &str, user_id: Uuid) -> Result<(), HandlerError> {
    if let Some(pos) = reactions.iter().position(|r| r.emoji == emoji) {
        let entry = &mut reactions[pos];
        if let Some(i) = entry.users.iter().position(|u| *u == user_id) {
            entry.users.remove(i);
            if entry.users.is_empty() {
                reactions.remove(pos);
            }
        } else {
            entry.users.push(user_id);
        }
        return Ok(());
    }
    if reactions.len() >= MAX_DISTINCT_REACTIONS {
        return Err(HandlerError::invalid("Too many reactions."));
    }
    reactions.push(Reaction {
        emoji: emoji.to_owned(),
        users: vec![user_id],
    });
    Ok(())
}
