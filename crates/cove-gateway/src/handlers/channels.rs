use std::collections::HashSet;

use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::events::ServerEvent;
use cove_types::models::{Channel, ChannelPermissions, Chat, ChatMember};

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, blocking, can, fetch_chat, require_member};

fn require_channels(chat: &Chat) -> Result<(), HandlerError> {
    if chat.is_private {
        return Err(HandlerError::invalid("A private chat has no channels."));
    }
    Ok(())
}

async fn fetch_channel(
    state: &GatewayState,
    chat_id: Uuid,
    channel_id: Uuid,
) -> Result<Channel, HandlerError> {
    blocking(&state.db, move |db| db.get_channel(channel_id))
        .await?
        .filter(|c| c.chat_id == chat_id)
        .ok_or_else(|| HandlerError::not_found("Channel is not found."))
}

fn require_can(
    chat: &Chat,
    member: &ChatMember,
    permission: &str,
    deny: &str,
) -> Result<(), HandlerError> {
    if can(chat, member, permission) {
        Ok(())
    } else {
        Err(HandlerError::forbidden(deny))
    }
}

pub async fn add_channel(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_name: String,
) -> Result<Value, HandlerError> {
    let name = channel_name.trim().to_owned();
    if name.is_empty() {
        return Err(HandlerError::invalid("Channel name cannot be empty."));
    }

    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_channels(&chat)?;
    let member = require_member(&chat, ctx.user_id)?;
    require_can(
        &chat,
        member,
        "canCreateChannels",
        "You do not have permission to create channels.",
    )?;

    // Appends after the current last channel; the first channel gets order 0.
    let order = blocking(&state.db, move |db| db.max_channel_order(chat_id))
        .await?
        .map_or(0, |max| max + 1);

    let channel = Channel {
        id: Uuid::new_v4(),
        chat_id,
        order,
        name,
        topic: None,
        permissions: ChannelPermissions::default(),
    };
    {
        let channel = channel.clone();
        blocking(&state.db, move |db| db.insert_channel(&channel)).await?;
    }

    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::ChannelAdded { chat_id, channel: channel.clone() },
        )
        .await;

    Ok(json!({ "channel": channel }))
}

pub async fn rename_channel(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    name: String,
) -> Result<Value, HandlerError> {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(HandlerError::invalid("Channel name cannot be empty."));
    }
    edit_channel(state, ctx, chat_id, channel_id, move |channel| {
        channel.name = name;
    })
    .await
}

pub async fn edit_channel_topic(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    topic: String,
) -> Result<Value, HandlerError> {
    edit_channel(state, ctx, chat_id, channel_id, move |channel| {
        let topic = topic.trim();
        channel.topic = (!topic.is_empty()).then(|| topic.to_owned());
    })
    .await
}

pub async fn update_channel_permissions(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    permissions: ChannelPermissions,
) -> Result<Value, HandlerError> {
    edit_channel(state, ctx, chat_id, channel_id, move |channel| {
        channel.permissions = permissions;
    })
    .await
}

/// Shared guard-then-mutate path for the three channel edits, all gated on
/// canEditChannels and all broadcasting the same `channelEdited` event.
async fn edit_channel<F>(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    apply: F,
) -> Result<Value, HandlerError>
where
    F: FnOnce(&mut Channel),
{
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_channels(&chat)?;
    let member = require_member(&chat, ctx.user_id)?;
    require_can(
        &chat,
        member,
        "canEditChannels",
        "You do not have permission to edit channels.",
    )?;

    let mut channel = fetch_channel(state, chat_id, channel_id).await?;
    apply(&mut channel);
    {
        let channel = channel.clone();
        blocking(&state.db, move |db| db.update_channel(&channel)).await?;
    }

    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::ChannelEdited { chat_id, channel: channel.clone() },
        )
        .await;

    Ok(json!({ "channel": channel }))
}

pub async fn delete_channel(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_channels(&chat)?;
    let member = require_member(&chat, ctx.user_id)?;
    require_can(
        &chat,
        member,
        "canDeleteChannels",
        "You do not have permission to delete channels.",
    )?;

    let channel = fetch_channel(state, chat_id, channel_id).await?;
    blocking(&state.db, move |db| db.delete_channel(channel_id)).await?;

    // Clients drop the cascade-deleted messages first, then the channel.
    // Both fire even for an empty channel; consumers handle each on its own.
    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::MessagesDeleted { chat_id, channel_id: channel.id },
        )
        .await;
    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::ChannelDeleted { chat_id, channel_id: channel.id },
        )
        .await;

    Ok(json!({}))
}

pub async fn change_channel_order(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_ids: Vec<Uuid>,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_channels(&chat)?;
    let member = require_member(&chat, ctx.user_id)?;
    require_can(
        &chat,
        member,
        "canEditChannels",
        "You do not have permission to reorder channels.",
    )?;
    require_can(
        &chat,
        member,
        "canCreateChannels",
        "You do not have permission to reorder channels.",
    )?;

    let existing = blocking(&state.db, move |db| db.get_channels(chat_id)).await?;
    let existing_ids: HashSet<Uuid> = existing.iter().map(|c| c.id).collect();
    let submitted: HashSet<Uuid> = channel_ids.iter().copied().collect();
    if channel_ids.len() != existing.len() || submitted != existing_ids {
        return Err(HandlerError::invalid(
            "Channel list must contain every channel of this chat exactly once.",
        ));
    }

    let orders: Vec<(Uuid, i64)> = channel_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i as i64))
        .collect();
    blocking(&state.db, move |db| db.reorder_channels(chat_id, &orders)).await?;

    let channels = blocking(&state.db, move |db| db.get_channels(chat_id)).await?;
    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::ChannelsUpdated { chat_id, channels: channels.clone() },
        )
        .await;

    Ok(json!({ "channels": channels }))
}
