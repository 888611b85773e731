//! The permission model: pure functions over role/permission names, consulted
//! by every mutating gateway handler. No room or session state is involved,
//! so everything here is unit-testable in isolation.

use uuid::Uuid;

use crate::models::Role;

/// Reserved built-in role names. These are never created, edited or deleted
/// through the mutation API.
pub const RESERVED_ROLES: [&str; 3] = [OWNER, ADMIN, MODERATOR];

pub const OWNER: &str = "Owner";
pub const ADMIN: &str = "Admin";
pub const MODERATOR: &str = "Moderator";

/// Effective ranks of the built-in roles. All custom-role permissions rank
/// 7 at most, so the built-ins always sit above them.
pub const MODERATOR_RANK: u8 = 8;
pub const ADMIN_RANK: u8 = 9;
pub const OWNER_RANK: u8 = 10;

/// Rank of a single permission name. Unrecognized names contribute 0.
pub fn rank_of(permission: &str) -> u8 {
    match permission {
        "canBan" | "canMute" | "canDeleteMessages" => 1,
        "canCreateChannels" | "canEditChannels" => 2,
        "canDeleteChannels" => 3,
        "canAssignRoles" => 4,
        "canAssignModerators" => 5,
        "canAssignAdmins" => 6,
        "canDeleteChatroom" => 7,
        _ => 0,
    }
}

/// Rank of a permission set: the maximum rank among its members.
pub fn rank<'a, I>(permissions: I) -> u8
where
    I: IntoIterator<Item = &'a str>,
{
    permissions.into_iter().map(rank_of).max().unwrap_or(0)
}

fn builtin_position(role: &str) -> Option<u8> {
    match role {
        OWNER => Some(3),
        ADMIN => Some(2),
        MODERATOR => Some(1),
        _ => None,
    }
}

/// Whether a holder of `actor_roles` may edit the membership of the built-in
/// role `target_role_name`, per the fixed assignability table: Owner targets
/// Admin and Moderator, Admin targets Moderator, Moderator targets nothing.
/// Reserved or otherwise unassignable names (including `Owner` itself) are
/// never editable.
pub fn can_edit_role(actor_roles: &[String], target_role_name: &str) -> bool {
    let Some(target_pos) = builtin_position(target_role_name) else {
        return false;
    };
    if target_role_name == OWNER {
        return false;
    }
    actor_roles
        .iter()
        .filter_map(|r| builtin_position(r))
        .any(|actor_pos| actor_pos > target_pos)
}

/// Whether an actor with `actor_permissions` may author a role carrying
/// `target_permissions`. True iff the target set ranks strictly below the
/// actor's own. Blocks privilege escalation through self-authored roles.
pub fn can_assign_below<'a, A, T>(actor_permissions: A, target_permissions: T) -> bool
where
    A: IntoIterator<Item = &'a str>,
    T: IntoIterator<Item = &'a str>,
{
    rank(target_permissions) < rank(actor_permissions)
}

/// Whether `actor_id` may add `role` to themself. The role must be flagged
/// self-assignable, and any allow-lists it declares must include the actor.
pub fn can_self_assign(role: &Role, actor_id: Uuid, actor_roles: &[String]) -> bool {
    if !role.can_be_self_assigned {
        return false;
    }
    if let Some(allowed) = &role.allowed_user_ids {
        if !allowed.contains(&actor_id) {
            return false;
        }
    }
    if let Some(allowed) = &role.allowed_roles {
        if !actor_roles.iter().any(|r| allowed.contains(r)) {
            return false;
        }
    }
    true
}
