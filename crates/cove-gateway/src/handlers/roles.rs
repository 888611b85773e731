use serde_json::{Value, json};
use uuid::Uuid;

use cove_types::events::ServerEvent;
use cove_types::models::{Chat, ChatMember, Role};
use cove_types::permissions::{
    self, ADMIN, ADMIN_RANK, MODERATOR, OWNER, OWNER_RANK, RESERVED_ROLES, can_edit_role,
    can_self_assign,
};

use crate::error::HandlerError;
use crate::registry::Room;
use crate::state::GatewayState;

use super::{Ctx, has_builtin, is_privileged, member_rank, update_chat};

fn require_roles(chat: &Chat) -> Result<(), HandlerError> {
    if chat.is_private {
        return Err(HandlerError::invalid("A private chat has no roles."));
    }
    Ok(())
}

fn require_privileged(chat: &Chat, member: &ChatMember) -> Result<(), HandlerError> {
    if is_privileged(chat, member) {
        Ok(())
    } else {
        Err(HandlerError::forbidden(
            "You do not have permission to manage roles.",
        ))
    }
}

/// Custom-role permission check that deliberately ignores the Admin/Owner
/// shortcut, for gates where the built-in hierarchy itself is the rule.
fn has_custom_perm(chat: &Chat, member: &ChatMember, permission: &str) -> bool {
    member.roles.iter().any(|name| {
        chat.role(name)
            .is_some_and(|r| r.permissions.iter().any(|p| p == permission))
    })
}

fn role_rank(role: &Role) -> u8 {
    permissions::rank(role.permissions.iter().map(String::as_str))
}

/// Cap for authoring roles. Owner and Admin sit above every custom role;
/// anyone else is bounded by the strongest permission their own custom roles
/// grant, so a Moderator cannot mint a permission they do not hold.
/// Assignment ordering (`member_rank`) keeps the Moderator title above
/// custom roles; authoring does not.
fn authoring_rank(chat: &Chat, member: &ChatMember) -> u8 {
    if has_builtin(member, OWNER) {
        return OWNER_RANK;
    }
    if has_builtin(member, ADMIN) {
        return ADMIN_RANK;
    }
    member
        .roles
        .iter()
        .filter_map(|name| chat.role(name))
        .map(role_rank)
        .max()
        .unwrap_or(0)
}

pub async fn create_role(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    role: Role,
) -> Result<Value, HandlerError> {
    let name = role.name.trim().to_owned();
    if name.is_empty() {
        return Err(HandlerError::invalid("Role name cannot be empty."));
    }
    if RESERVED_ROLES.contains(&name.as_str()) {
        return Err(HandlerError::invalid("You cannot use a reserved role name."));
    }
    let role = Role { name, ..role };

    let actor_id = ctx.user_id;
    let (chat, updated) = update_chat(state, chat_id, move |chat| {
        require_roles(chat)?;
        let actor = chat
            .member(actor_id)
            .cloned()
            .ok_or_else(|| HandlerError::forbidden("You are not a member of this chat."))?;
        require_privileged(chat, &actor)?;
        if role_rank(&role) >= authoring_rank(chat, &actor) {
            return Err(HandlerError::forbidden(
                "You cannot create roles equal to or greater than your own.",
            ));
        }
        if chat.role(&role.name).is_some() {
            return Err(HandlerError::conflict("Role already exists."));
        }
        chat.roles.push(role.clone());
        Ok(role.clone())
    })
    .await?;

    state
        .registry
        .broadcast(Room::Chat(chat_id), ServerEvent::ChatUpdated { chat })
        .await;

    Ok(json!({ "updatedRole": updated }))
}

pub async fn edit_role(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    role: Role,
) -> Result<Value, HandlerError> {
    if RESERVED_ROLES.contains(&role.name.as_str()) {
        return Err(HandlerError::invalid("You cannot edit a default role."));
    }

    let actor_id = ctx.user_id;
    let (chat, updated) = update_chat(state, chat_id, move |chat| {
        require_roles(chat)?;
        let actor = chat
            .member(actor_id)
            .cloned()
            .ok_or_else(|| HandlerError::forbidden("You are not a member of this chat."))?;
        require_privileged(chat, &actor)?;

        let pos = chat
            .roles
            .iter()
            .position(|r| r.name == role.name)
            .ok_or_else(|| HandlerError::not_found("Role is not found."))?;
        // The actor must outrank both the role as it stands and the role as
        // it would become.
        let rank_cap = authoring_rank(chat, &actor);
        if role_rank(&chat.roles[pos]) >= rank_cap || role_rank(&role) >= rank_cap {
            return Err(HandlerError::forbidden(
                "You cannot create roles equal to or greater than your own.",
            ));
        }
        chat.roles[pos] = role.clone();
        Ok(role.clone())
    })
    .await?;

    state
        .registry
        .broadcast(Room::Chat(chat_id), ServerEvent::ChatUpdated { chat })
        .await;

    Ok(json!({ "updatedRole": updated }))
}

pub async fn assign_role(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    user_id: Uuid,
    role_name: String,
) -> Result<Value, HandlerError> {
    let actor_id = ctx.user_id;
    let (_, member) = update_chat(state, chat_id, move |chat| {
        require_roles(chat)?;
        let actor = chat
            .member(actor_id)
            .cloned()
            .ok_or_else(|| HandlerError::forbidden("You are not a member of this chat."))?;
        let target = chat
            .member(user_id)
            .ok_or_else(|| HandlerError::not_found("Member is not found."))?;
        if target.roles.iter().any(|r| r == &role_name) {
            return Err(HandlerError::conflict("Member already has this role."));
        }

        match role_name.as_str() {
            OWNER => {
                return Err(HandlerError::forbidden("You cannot assign the Owner role."));
            }
            ADMIN => {
                if !can_edit_role(&actor.roles, ADMIN)
                    && !has_custom_perm(chat, &actor, "canAssignAdmins")
                {
                    return Err(HandlerError::forbidden("You cannot assign admins."));
                }
            }
            MODERATOR => {
                if !can_edit_role(&actor.roles, MODERATOR)
                    && !has_custom_perm(chat, &actor, "canAssignModerators")
                {
                    return Err(HandlerError::forbidden("You cannot assign moderators."));
                }
            }
            custom => {
                let role = chat
                    .role(custom)
                    .ok_or_else(|| HandlerError::not_found("Role is not found."))?;
                let self_assign =
                    user_id == actor_id && can_self_assign(role, actor_id, &actor.roles);
                if !self_assign {
                    require_privileged(chat, &actor)?;
                    if role_rank(role) >= member_rank(chat, &actor) {
                        return Err(HandlerError::forbidden(
                            "You cannot assign a role higher or equal to your own.",
                        ));
                    }
                }
            }
        }

        let target = chat
            .member_mut(user_id)
            .ok_or_else(|| HandlerError::not_found("Member is not found."))?;
        target.roles.push(role_name.clone());
        Ok(target.clone())
    })
    .await?;

    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::MemberUpdated { chat_id, member: member.clone() },
        )
        .await;

    Ok(json!({ "member": member }))
}

pub async fn remove_role(
    state: &GatewayState,
    ctx: &Ctx,
    chat_id: Uuid,
    user_id: Uuid,
    role_name: String,
) -> Result<Value, HandlerError> {
    let actor_id = ctx.user_id;
    let (_, member) = update_chat(state, chat_id, move |chat| {
        require_roles(chat)?;
        let actor = chat
            .member(actor_id)
            .cloned()
            .ok_or_else(|| HandlerError::forbidden("You are not a member of this chat."))?;
        let target = chat
            .member(user_id)
            .ok_or_else(|| HandlerError::not_found("Member is not found."))?;
        if !target.roles.iter().any(|r| r == &role_name) {
            return Err(HandlerError::conflict("Member does not have this role."));
        }

        match role_name.as_str() {
            OWNER => {
                return Err(HandlerError::forbidden("You cannot remove the Owner role."));
            }
            ADMIN => {
                if !can_edit_role(&actor.roles, ADMIN)
                    && !has_custom_perm(chat, &actor, "canAssignAdmins")
                {
                    return Err(HandlerError::forbidden("You cannot remove admins."));
                }
            }
            MODERATOR => {
                if !can_edit_role(&actor.roles, MODERATOR)
                    && !has_custom_perm(chat, &actor, "canAssignModerators")
                {
                    return Err(HandlerError::forbidden("You cannot remove moderators."));
                }
            }
            custom => {
                // A member can always take off a role they could have put on
                // themselves. A role deleted from the chat is removable by
                // any privileged member.
                let role = chat.role(custom);
                let self_remove = user_id == actor_id
                    && role.is_some_and(|r| can_self_assign(r, actor_id, &actor.roles));
                if !self_remove {
                    require_privileged(chat, &actor)?;
                    if let Some(role) = role {
                        if role_rank(role) >= member_rank(chat, &actor) {
                            return Err(HandlerError::forbidden(
                                "You cannot remove a role higher or equal to your own.",
                            ));
                        }
                    }
                }
            }
        }

        let target = chat
            .member_mut(user_id)
            .ok_or_else(|| HandlerError::not_found("Member is not found."))?;
        target.roles.retain(|r| r != &role_name);
        Ok(target.clone())
    })
    .await?;

    state
        .registry
        .broadcast(
            Room::Chat(chat_id),
            ServerEvent::MemberUpdated { chat_id, member: member.clone() },
        )
        .await;

    Ok(json!({ "member": member }))
}
