use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::events::ServerEvent;
use cove_types::models::UserStatus;

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, blocking, fetch_chat, require_member};

/// Typing signals are relayed, not stored: everyone subscribed to the channel
/// scope sees them except the typist, and nothing is persisted.
pub async fn typing(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    channel_id: Uuid,
    started: bool,
) -> Result<Value, HandlerError> {
    let (chat, _) = fetch_chat(state, chat_id).await?;
    require_member(&chat, ctx.user_id)?;

    let event = if started {
        ServerEvent::UserTypingStart {
            chat_id,
            channel_id,
            user_id: ctx.user_id,
            username: ctx.username.clone(),
        }
    } else {
        ServerEvent::UserTypingStop {
            chat_id,
            channel_id,
            user_id: ctx.user_id,
            username: ctx.username.clone(),
        }
    };
    state
        .registry
        .broadcast_except(Room::Channel { chat_id, channel_id }, ctx.session, event)
        .await;

    Ok(json!({}))
}

pub async fn edit_status(
    state: &GatewayState,
    ctx: &Ctx,
    status: UserStatus,
) -> Result<Value, HandlerError> {
    let me = ctx.user_id;
    let mut profile = blocking(&state.db, move |db| db.get_profile(me))
        .await?
        .ok_or_else(|| HandlerError::not_found("User is not found."))?;
    profile.status = status;
    blocking(&state.db, move |db| db.save_profile(me, &profile)).await?;

    // Relayed to everyone else; the issuer is not echoed.
    match status {
        UserStatus::Idle => {
            state
                .registry
                .broadcast_all_except(me, ServerEvent::UserIdle { user_id: me })
                .await;
        }
        UserStatus::Online => {
            state
                .registry
                .broadcast_all_except(me, ServerEvent::UserActive { user_id: me })
                .await;
        }
        // Going invisible is not announced; the presence tracker still
        // reports the socket itself.
        UserStatus::Offline => {}
    }

    Ok(json!({}))
}
