use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::events::ServerEvent;
use cove_types::models::{Chat, DeletionRequest, Notification, NotificationKind, UserProfile};

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, blocking, fetch_chat, require_member};

async fn fetch_profile(
    state: &GatewayState,
    user_id: Uuid,
) -> Result<UserProfile, HandlerError> {
    blocking(&state.db, move |db| db.get_profile(user_id))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))
}

async fn save_profile(
    state: &GatewayState,
    user_id: Uuid,
    profile: UserProfile,
) -> Result<(), HandlerError> {
    blocking(&state.db, move |db| db.save_profile(user_id, &profile)).await
}

/// Persist a notification and push it to every live session of its
/// recipient. Offline recipients pick it up from the notifications endpoint.
async fn notify(
    state: &GatewayState,
    ctx: &Ctx,
    recipient: Uuid,
    kind: NotificationKind,
    message: String,
    link: Option<String>,
) -> Result<(), HandlerError> {
    let notification = Notification {
        id: Uuid::new_v4(),
        sender: Some(ctx.user_id),
        recipient,
        kind,
        message: Some(message),
        link,
        read: false,
        created_at: Utc::now(),
    };
    {
        let notification = notification.clone();
        blocking(&state.db, move |db| db.insert_notification(&notification)).await?;
    }
    state
        .registry
        .emit_to_user(recipient, ServerEvent::Notification { notification })
        .await;
    Ok(())
}

/// Delete the notification a pending social action created, telling the
/// recipient's sessions to drop it. Harmless when it was already dismissed.
async fn consume_notification(
    state: &GatewayState,
    recipient: Uuid,
    sender: Uuid,
    kind: NotificationKind,
) -> Result<(), HandlerError> {
    let found =
        blocking(&state.db, move |db| db.find_notification(recipient, sender, kind)).await?;
    if let Some(notification) = found {
        let id = notification.id;
        blocking(&state.db, move |db| db.delete_notification(id)).await?;
        state
            .registry
            .emit_to_user(recipient, ServerEvent::NotificationDeleted { notification_id: id })
            .await;
    }
    Ok(())
}

pub async fn send_friend_request(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    if user_id == ctx.user_id {
        return Err(HandlerError::invalid(
            "You cannot send a friend request to yourself.",
        ));
    }
    let mut target = fetch_profile(state, user_id).await?;
    let mine = fetch_profile(state, ctx.user_id).await?;

    if mine.friends.contains(&user_id) {
        return Err(HandlerError::conflict("You are already friends."));
    }
    if target.pending_requests.contains(&ctx.user_id) {
        return Err(HandlerError::conflict("Friend request already sent."));
    }
    if mine.pending_requests.contains(&user_id) {
        return Err(HandlerError::conflict(
            "This user has already sent you a friend request.",
        ));
    }
    if mine.banlist.contains(&user_id) || target.banlist.contains(&ctx.user_id) {
        return Err(HandlerError::forbidden(
            "You cannot send a friend request to this user.",
        ));
    }

    target.pending_requests.push(ctx.user_id);
    save_profile(state, user_id, target).await?;
    notify(
        state,
        ctx,
        user_id,
        NotificationKind::FriendRequest,
        format!("{} sent you a friend request.", ctx.username),
        None,
    )
    .await?;

    Ok(json!({}))
}

pub async fn accept_friend_request(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    let mut mine = fetch_profile(state, ctx.user_id).await?;
    let mut theirs = fetch_profile(state, user_id).await?;

    if !mine.pending_requests.contains(&user_id) {
        return Err(HandlerError::not_found("Friend request is not found."));
    }

    // The friendship becomes visible on both sides atomically or not at all.
    mine.pending_requests.retain(|id| *id != user_id);
    if !mine.friends.contains(&user_id) {
        mine.friends.push(user_id);
    }
    if !theirs.friends.contains(&ctx.user_id) {
        theirs.friends.push(ctx.user_id);
    }
    {
        let me = ctx.user_id;
        blocking(&state.db, move |db| {
            db.save_profiles(&[(me, &mine), (user_id, &theirs)])
        })
        .await?;
    }

    consume_notification(state, ctx.user_id, user_id, NotificationKind::FriendRequest).await?;
    notify(
        state,
        ctx,
        user_id,
        NotificationKind::FriendAccepted,
        format!("{} accepted your friend request.", ctx.username),
        None,
    )
    .await?;

    Ok(json!({}))
}

pub async fn decline_friend_request(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    let mut mine = fetch_profile(state, ctx.user_id).await?;
    if !mine.pending_requests.contains(&user_id) {
        return Err(HandlerError::not_found("Friend request is not found."));
    }

    mine.pending_requests.retain(|id| *id != user_id);
    save_profile(state, ctx.user_id, mine).await?;

    consume_notification(state, ctx.user_id, user_id, NotificationKind::FriendRequest).await?;
    notify(
        state,
        ctx,
        user_id,
        NotificationKind::FriendDeclined,
        format!("{} declined your friend request.", ctx.username),
        None,
    )
    .await?;

    Ok(json!({}))
}

pub async fn remove_friend(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    let mut mine = fetch_profile(state, ctx.user_id).await?;
    let mut theirs = fetch_profile(state, user_id).await?;

    if !mine.friends.contains(&user_id) {
        return Err(HandlerError::not_found(
            "You are not friends with this user.",
        ));
    }

    mine.friends.retain(|id| *id != user_id);
    theirs.friends.retain(|id| *id != ctx.user_id);
    {
        let me = ctx.user_id;
        blocking(&state.db, move |db| {
            db.save_profiles(&[(me, &mine), (user_id, &theirs)])
        })
        .await?;
    }

    Ok(json!({}))
}

/// Banning also severs the existing relationship: the friendship and any
/// pending requests in either direction are cleared in the same write.
pub async fn ban_user(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    if user_id == ctx.user_id {
        return Err(HandlerError::invalid("You cannot ban yourself."));
    }
    let mut mine = fetch_profile(state, ctx.user_id).await?;
    let mut theirs = fetch_profile(state, user_id).await?;

    if mine.banlist.contains(&user_id) {
        return Err(HandlerError::conflict("User is already banned."));
    }

    mine.banlist.push(user_id);
    mine.friends.retain(|id| *id != user_id);
    mine.pending_requests.retain(|id| *id != user_id);
    theirs.friends.retain(|id| *id != ctx.user_id);
    theirs.pending_requests.retain(|id| *id != ctx.user_id);
    {
        let me = ctx.user_id;
        blocking(&state.db, move |db| {
            db.save_profiles(&[(me, &mine), (user_id, &theirs)])
        })
        .await?;
    }

    Ok(json!({}))
}

pub async fn unban_user(
    state: &GatewayState,
    ctx: &Ctx,
    user_id: Uuid,
) -> Result<Value, HandlerError> {
    let mut mine = fetch_profile(state, ctx.user_id).await?;
    if !mine.banlist.contains(&user_id) {
        return Err(HandlerError::conflict("User is not banned."));
    }

    mine.banlist.retain(|id| *id != user_id);
    save_profile(state, ctx.user_id, mine).await?;

    Ok(json!({}))
}

/// First half of the two-party private-chat deletion handshake: record the
/// pending request on the requester and notify the other member.
pub async fn delete_private_chat_request(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if !chat.is_private {
        return Err(HandlerError::invalid(
            "Only private chats are deleted by request.",
        ));
    }
    require_member(&chat, ctx.user_id)?;
    let other = other_member(&chat, ctx.user_id)?;

    let mut mine = fetch_profile(state, ctx.user_id).await?;
    let request = DeletionRequest { chat_id, to: other };
    if mine.deletion_requests.contains(&request) {
        return Err(HandlerError::conflict("Deletion request already sent."));
    }

    mine.deletion_requests.push(request);
    save_profile(state, ctx.user_id, mine).await?;
    notify(
        state,
        ctx,
        other,
        NotificationKind::PrivateChatDeletionRequested,
        format!("{} wants to delete your private chat.", ctx.username),
        Some(chat_id.to_string()),
    )
    .await?;

    Ok(json!({}))
}

/// Second half, taken by the member who received the request. Consent from
/// both sides destroys the chat and its messages.
pub async fn confirm_delete_private_chat(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if !chat.is_private {
        return Err(HandlerError::invalid(
            "Only private chats are deleted by request.",
        ));
    }
    require_member(&chat, ctx.user_id)?;
    let requester = other_member(&chat, ctx.user_id)?;

    let mut requester_profile = fetch_profile(state, requester).await?;
    let request = DeletionRequest { chat_id, to: ctx.user_id };
    if !requester_profile.deletion_requests.contains(&request) {
        return Err(HandlerError::not_found("Deletion request is not found."));
    }

    requester_profile.deletion_requests.retain(|r| *r != request);
    save_profile(state, requester, requester_profile).await?;

    blocking(&state.db, move |db| db.delete_chat(chat_id)).await?;
    state
        .registry
        .broadcast(Room::Chat(chat_id), ServerEvent::ChatDeleted { chat_id })
        .await;
    // Members may not have the chat open; tell every one of their sessions.
    state
        .registry
        .emit_to_user(requester, ServerEvent::ChatDeleted { chat_id })
        .await;

    consume_notification(
        state,
        ctx.user_id,
        requester,
        NotificationKind::PrivateChatDeletionRequested,
    )
    .await?;

    Ok(json!({}))
}

/// Declining clears the pending request, so the requester may ask again
/// later, and tells them the outcome.
pub async fn decline_private_chat_deletion(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    if !chat.is_private {
        return Err(HandlerError::invalid(
            "Only private chats are deleted by request.",
        ));
    }
    require_member(&chat, ctx.user_id)?;
    let requester = other_member(&chat, ctx.user_id)?;

    let mut requester_profile = fetch_profile(state, requester).await?;
    let request = DeletionRequest { chat_id, to: ctx.user_id };
    if !requester_profile.deletion_requests.contains(&request) {
        return Err(HandlerError::not_found("Deletion request is not found."));
    }

    requester_profile.deletion_requests.retain(|r| *r != request);
    save_profile(state, requester, requester_profile).await?;

    consume_notification(
        state,
        ctx.user_id,
        requester,
        NotificationKind::PrivateChatDeletionRequested,
    )
    .await?;
    notify(
        state,
        ctx,
        requester,
        NotificationKind::PrivateChatDeletionDeclined,
        format!("{} declined the deletion of your private chat.", ctx.username),
        Some(chat_id.to_string()),
    )
    .await?;

    Ok(json!({}))
}

fn other_member(chat: &Chat, user_id: Uuid) -> Result<Uuid, HandlerError> {
    chat.members
        .iter()
        .map(|m| m.user_id)
        .find(|id| *id != user_id)
        .ok_or_else(|| HandlerError::not_found("Member is not found."))
}
