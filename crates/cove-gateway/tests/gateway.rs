use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use cove_db::Database;
use cove_gateway::GatewayState;
use cove_gateway::handlers::{self, Ctx};
use cove_gateway::registry::Room;
use cove_types::events::ServerEvent;
use cove_types::models::{ChannelPermissions, Chat, ChatMember, Role, UserStatus};

fn state() -> GatewayState {
    let db = Database::open_in_memory().expect("in-memory db");
    GatewayState::new(Arc::new(db))
}

/// Create a user and a live session for them, as the connection loop would.
async fn connect(state: &GatewayState, name: &str) -> (Ctx, mpsc::UnboundedReceiver<ServerEvent>) {
    let user_id = Uuid::new_v4();
    state.db.create_user(user_id, name, "hash").unwrap();
    let (session, rx) = state.registry.register_session(user_id).await;
    (
        Ctx {
            session,
            user_id,
            username: name.to_owned(),
        },
        rx,
    )
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = vec![];
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn chat_from_ack(ack: &Value) -> Chat {
    serde_json::from_value(ack["chat"].clone()).unwrap()
}

async fn create_chat(state: &GatewayState, ctx: &Ctx, name: &str) -> Chat {
    let ack = handlers::chats::create_chat(state, ctx, name.to_owned())
        .await
        .unwrap();
    chat_from_ack(&ack)
}

#[tokio::test]
async fn create_chat_makes_creator_owner_and_joins_room() {
    let state = state();
    let (alice, mut rx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    assert_eq!(chat.member(alice.user_id).unwrap().roles, vec!["Owner"]);
    assert!(state.registry.is_joined(alice.session, Room::Chat(chat.id)).await);

    // Creator sees subsequent room traffic without an explicit join.
    state
        .registry
        .broadcast(Room::Chat(chat.id), ServerEvent::ChatDeleted { chat_id: chat.id })
        .await;
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn empty_chat_name_is_rejected() {
    let state = state();
    let (alice, _rx) = connect(&state, "alice").await;
    let err = handlers::chats::create_chat(&state, &alice, "   ".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Chat name cannot be empty.");
}

#[tokio::test]
async fn open_private_chat_is_idempotent_in_both_directions() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let first = handlers::chats::open_private_chat(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let second = handlers::chats::open_private_chat(&state, &bob, alice.user_id)
        .await
        .unwrap();
    assert_eq!(first["chat"]["id"], second["chat"]["id"]);
    assert_eq!(first["chat"]["isPrivate"], true);
}

#[tokio::test]
async fn banned_users_cannot_open_private_chats() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    handlers::social::ban_user(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let err = handlers::chats::open_private_chat(&state, &bob, alice.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot message this user.");
}

#[tokio::test]
async fn join_chat_room_requires_membership() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (mallory, _mrx) = connect(&state, "mallory").await;

    let chat = create_chat(&state, &alice, "general").await;
    let err = handlers::chats::join_chat_room(&state, &mallory, chat.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You are not a member of this chat.");
    assert!(!state.registry.is_joined(mallory.session, Room::Chat(chat.id)).await);
}

#[tokio::test]
async fn message_fans_out_to_room_members_only() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;
    let (bob, mut brx) = connect(&state, "bob").await;
    let (eve, mut erx) = connect(&state, "eve").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let channel_ack = handlers::channels::add_channel(&state, &alice, chat.id, "lounge".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(channel_ack["channel"]["id"].clone()).unwrap();

    handlers::chats::join_chat_room(&state, &bob, chat.id, None)
        .await
        .unwrap();
    drain(&mut arx);
    drain(&mut brx);

    let ack = handlers::messages::send_message(&state, &alice, chat.id, channel_id, "hi".into())
        .await
        .unwrap();
    assert_eq!(ack["message"]["text"], "hi");

    assert!(matches!(drain(&mut arx).as_slice(), [ServerEvent::Message { .. }]));
    assert!(matches!(drain(&mut brx).as_slice(), [ServerEvent::Message { .. }]));
    assert!(drain(&mut erx).is_empty());
}

#[tokio::test]
async fn read_only_channel_blocks_regular_members_but_not_owner() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let channel_ack = handlers::channels::add_channel(&state, &alice, chat.id, "rules".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(channel_ack["channel"]["id"].clone()).unwrap();
    handlers::channels::update_channel_permissions(
        &state,
        &alice,
        chat.id,
        channel_id,
        ChannelPermissions { read_only: true, ..Default::default() },
    )
    .await
    .unwrap();

    let err = handlers::messages::send_message(&state, &bob, chat.id, channel_id, "hey".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "This channel is read-only.");

    handlers::messages::send_message(&state, &alice, chat.id, channel_id, "rules".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn channels_append_in_order_and_reorder_requires_permutation() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    let a = handlers::channels::add_channel(&state, &alice, chat.id, "a".into())
        .await
        .unwrap();
    let b = handlers::channels::add_channel(&state, &alice, chat.id, "b".into())
        .await
        .unwrap();
    assert_eq!(a["channel"]["order"], 0);
    assert_eq!(b["channel"]["order"], 1);

    let a_id: Uuid = serde_json::from_value(a["channel"]["id"].clone()).unwrap();
    let b_id: Uuid = serde_json::from_value(b["channel"]["id"].clone()).unwrap();

    let err = handlers::channels::change_channel_order(&state, &alice, chat.id, vec![a_id])
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Channel list must contain every channel of this chat exactly once."
    );

    let ack =
        handlers::channels::change_channel_order(&state, &alice, chat.id, vec![b_id, a_id])
            .await
            .unwrap();
    assert_eq!(ack["channels"][0]["id"], b_id.to_string());
    assert_eq!(ack["channels"][1]["id"], a_id.to_string());
}

#[tokio::test]
async fn deleting_a_channel_cascades_its_messages() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    let ack = handlers::channels::add_channel(&state, &alice, chat.id, "doomed".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(ack["channel"]["id"].clone()).unwrap();
    handlers::messages::send_message(&state, &alice, chat.id, channel_id, "bye".into())
        .await
        .unwrap();
    drain(&mut arx);

    handlers::channels::delete_channel(&state, &alice, chat.id, channel_id)
        .await
        .unwrap();

    let events = drain(&mut arx);
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::MessagesDeleted { .. }, ServerEvent::ChannelDeleted { .. }]
    ));
    assert!(state.db.get_messages(chat.id, 10).unwrap().is_empty());
}

#[tokio::test]
async fn deleting_an_empty_channel_still_announces_both_events() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    let ack = handlers::channels::add_channel(&state, &alice, chat.id, "quiet".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(ack["channel"]["id"].clone()).unwrap();
    drain(&mut arx);

    handlers::channels::delete_channel(&state, &alice, chat.id, channel_id)
        .await
        .unwrap();
    assert!(matches!(
        drain(&mut arx).as_slice(),
        [ServerEvent::MessagesDeleted { .. }, ServerEvent::ChannelDeleted { .. }]
    ));
}

fn role(name: &str, permissions: &[&str]) -> Role {
    Role {
        name: name.to_owned(),
        description: None,
        permissions: permissions.iter().map(|p| (*p).to_owned()).collect(),
        allowed_user_ids: None,
        allowed_roles: None,
        can_be_self_assigned: false,
    }
}

#[tokio::test]
async fn role_creation_is_capped_strictly_below_the_creator() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (carol, _crx) = connect(&state, "carol").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: carol.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    // Owner creates a helper role and hands it to carol.
    handlers::roles::create_role(&state, &alice, chat.id, role("Helper", &["canMute"]))
        .await
        .unwrap();
    handlers::roles::assign_role(&state, &alice, chat.id, carol.user_id, "Helper".into())
        .await
        .unwrap();

    // A canMute holder ranks 1 and cannot author another rank-1 role.
    let err = handlers::roles::create_role(&state, &carol, chat.id, role("Peer", &["canBan"]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You cannot create roles equal to or greater than your own."
    );
}

#[tokio::test]
async fn moderators_cannot_author_permissions_they_do_not_hold() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (mallory, _mrx) = connect(&state, "mallory").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember {
        user_id: mallory.user_id,
        roles: vec!["Moderator".to_owned()],
    });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    // The Moderator title clears the privilege bar but contributes nothing
    // to the authoring cap; a held custom role sets it instead.
    handlers::roles::create_role(
        &state,
        &alice,
        chat.id,
        role("Builder", &["canCreateChannels"]),
    )
    .await
    .unwrap();
    handlers::roles::assign_role(&state, &alice, chat.id, mallory.user_id, "Builder".into())
        .await
        .unwrap();

    let err = handlers::roles::create_role(
        &state,
        &mallory,
        chat.id,
        role("SuperAdmin", &["canDeleteChatroom"]),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You cannot create roles equal to or greater than your own."
    );

    // Editing an existing role into the same escalation is blocked too.
    let err = handlers::roles::edit_role(
        &state,
        &mallory,
        chat.id,
        role("Builder", &["canDeleteChatroom"]),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You cannot create roles equal to or greater than your own."
    );

    // Strictly below the held canCreateChannels rank is fine.
    handlers::roles::create_role(&state, &mallory, chat.id, role("Usher", &["canBan"]))
        .await
        .unwrap();

    // Admins keep the implicit bypass over every custom role.
    handlers::roles::assign_role(&state, &alice, chat.id, mallory.user_id, "Admin".into())
        .await
        .unwrap();
    handlers::roles::create_role(
        &state,
        &mallory,
        chat.id,
        role("Janitor", &["canDeleteChatroom"]),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn reserved_role_names_are_rejected() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let chat = create_chat(&state, &alice, "general").await;

    let err = handlers::roles::create_role(&state, &alice, chat.id, role("Admin", &[]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot use a reserved role name.");
}

#[tokio::test]
async fn builtin_assignment_follows_the_fixed_hierarchy() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;
    let (carol, _crx) = connect(&state, "carol").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    chat.members.push(ChatMember { user_id: carol.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    // Owner may mint admins.
    let ack = handlers::roles::assign_role(&state, &alice, chat.id, bob.user_id, "Admin".into())
        .await
        .unwrap();
    assert_eq!(ack["member"]["roles"][0], "Admin");

    // An admin may not mint another admin, but may mint moderators.
    let err = handlers::roles::assign_role(&state, &bob, chat.id, carol.user_id, "Admin".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot assign admins.");
    handlers::roles::assign_role(&state, &bob, chat.id, carol.user_id, "Moderator".into())
        .await
        .unwrap();

    // Nobody assigns Owner, and duplicates are conflicts.
    let err = handlers::roles::assign_role(&state, &alice, chat.id, bob.user_id, "Owner".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot assign the Owner role.");
    let err =
        handlers::roles::assign_role(&state, &bob, chat.id, carol.user_id, "Moderator".into())
            .await
            .unwrap_err();
    assert_eq!(err.to_string(), "Member already has this role.");
}

#[tokio::test]
async fn flagged_roles_can_be_self_assigned_by_anyone_listed() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let mut pronouns = role("they-them", &[]);
    pronouns.can_be_self_assigned = true;
    handlers::roles::create_role(&state, &alice, chat.id, pronouns)
        .await
        .unwrap();

    let ack =
        handlers::roles::assign_role(&state, &bob, chat.id, bob.user_id, "they-them".into())
            .await
            .unwrap();
    assert_eq!(ack["member"]["roles"][0], "they-them");

    // But bob cannot hand it to someone else.
    let err =
        handlers::roles::assign_role(&state, &bob, chat.id, alice.user_id, "they-them".into())
            .await
            .unwrap_err();
    assert_eq!(err.to_string(), "You do not have permission to manage roles.");
}

#[tokio::test]
async fn only_the_sender_edits_but_moderators_delete() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember {
        user_id: bob.user_id,
        roles: vec!["Moderator".to_owned()],
    });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let channel_ack = handlers::channels::add_channel(&state, &alice, chat.id, "talk".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(channel_ack["channel"]["id"].clone()).unwrap();
    let ack = handlers::messages::send_message(&state, &alice, chat.id, channel_id, "v1".into())
        .await
        .unwrap();
    let message_id: Uuid = serde_json::from_value(ack["message"]["id"].clone()).unwrap();

    let err = handlers::messages::edit_message(&state, &bob, chat.id, message_id, "v2".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You can only edit your own messages.");

    let ack = handlers::messages::edit_message(&state, &alice, chat.id, message_id, "v2".into())
        .await
        .unwrap();
    assert_eq!(ack["message"]["isEdited"], true);

    handlers::messages::delete_message(&state, &bob, chat.id, message_id)
        .await
        .unwrap();
    assert!(state.db.get_message(message_id).unwrap().is_none());
}

#[tokio::test]
async fn replying_to_yourself_is_rejected() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    let channel_ack = handlers::channels::add_channel(&state, &alice, chat.id, "talk".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(channel_ack["channel"]["id"].clone()).unwrap();
    let ack = handlers::messages::send_message(&state, &alice, chat.id, channel_id, "hi".into())
        .await
        .unwrap();
    let message_id: Uuid = serde_json::from_value(ack["message"]["id"].clone()).unwrap();

    let err = handlers::messages::reply(&state, &alice, chat.id, message_id, "me too".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "You cannot reply to your own message.");
}

#[tokio::test]
async fn reactions_require_a_single_emoji() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;

    let chat = create_chat(&state, &alice, "general").await;
    let channel_ack = handlers::channels::add_channel(&state, &alice, chat.id, "talk".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(channel_ack["channel"]["id"].clone()).unwrap();
    let ack = handlers::messages::send_message(&state, &alice, chat.id, channel_id, "hi".into())
        .await
        .unwrap();
    let message_id: Uuid = serde_json::from_value(ack["message"]["id"].clone()).unwrap();

    let err =
        handlers::messages::toggle_reaction(&state, &alice, chat.id, message_id, "nope".into())
            .await
            .unwrap_err();
    assert_eq!(err.to_string(), "Reaction must be a single emoji.");

    let ack =
        handlers::messages::toggle_reaction(&state, &alice, chat.id, message_id, "🔥".into())
            .await
            .unwrap();
    assert_eq!(ack["reactions"][0]["emoji"], "🔥");
}

#[tokio::test]
async fn friend_request_accept_creates_a_symmetric_friendship() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, mut brx) = connect(&state, "bob").await;

    handlers::social::send_friend_request(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let events = drain(&mut brx);
    assert!(matches!(events.as_slice(), [ServerEvent::Notification { .. }]));
    assert_eq!(state.db.get_notifications(bob.user_id).unwrap().len(), 1);

    // Duplicates and reversals are conflicts while the request is pending.
    let err = handlers::social::send_friend_request(&state, &alice, bob.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Friend request already sent.");
    let err = handlers::social::send_friend_request(&state, &bob, alice.user_id)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This user has already sent you a friend request."
    );

    handlers::social::accept_friend_request(&state, &bob, alice.user_id)
        .await
        .unwrap();
    let mine = state.db.get_profile(alice.user_id).unwrap().unwrap();
    let theirs = state.db.get_profile(bob.user_id).unwrap().unwrap();
    assert!(mine.friends.contains(&bob.user_id));
    assert!(theirs.friends.contains(&alice.user_id));
    // The originating notification was consumed.
    assert!(state.db.get_notifications(bob.user_id).unwrap().is_empty());
}

#[tokio::test]
async fn banning_severs_the_friendship_and_blocks_new_requests() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    handlers::social::send_friend_request(&state, &alice, bob.user_id)
        .await
        .unwrap();
    handlers::social::accept_friend_request(&state, &bob, alice.user_id)
        .await
        .unwrap();

    handlers::social::ban_user(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let mine = state.db.get_profile(alice.user_id).unwrap().unwrap();
    let theirs = state.db.get_profile(bob.user_id).unwrap().unwrap();
    assert!(mine.friends.is_empty());
    assert!(theirs.friends.is_empty());

    let err = handlers::social::send_friend_request(&state, &bob, alice.user_id)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You cannot send a friend request to this user."
    );

    handlers::social::unban_user(&state, &alice, bob.user_id)
        .await
        .unwrap();
    handlers::social::send_friend_request(&state, &bob, alice.user_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn private_chat_deletion_needs_both_parties() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, mut brx) = connect(&state, "bob").await;

    let ack = handlers::chats::open_private_chat(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let chat_id: Uuid = serde_json::from_value(ack["chat"]["id"].clone()).unwrap();

    // Bob alone cannot confirm a deletion nobody requested.
    let err = handlers::social::confirm_delete_private_chat(&state, &bob, chat_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Deletion request is not found.");

    handlers::social::delete_private_chat_request(&state, &alice, chat_id)
        .await
        .unwrap();
    assert!(matches!(
        drain(&mut brx).as_slice(),
        [ServerEvent::Notification { .. }]
    ));

    handlers::social::confirm_delete_private_chat(&state, &bob, chat_id)
        .await
        .unwrap();
    assert!(state.db.get_chat(chat_id).unwrap().is_none());
}

#[tokio::test]
async fn declined_deletion_can_be_requested_again() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let ack = handlers::chats::open_private_chat(&state, &alice, bob.user_id)
        .await
        .unwrap();
    let chat_id: Uuid = serde_json::from_value(ack["chat"]["id"].clone()).unwrap();

    handlers::social::delete_private_chat_request(&state, &alice, chat_id)
        .await
        .unwrap();
    let err = handlers::social::delete_private_chat_request(&state, &alice, chat_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Deletion request already sent.");

    drain(&mut arx);
    handlers::social::decline_private_chat_deletion(&state, &bob, chat_id)
        .await
        .unwrap();
    assert!(state.db.get_chat(chat_id).unwrap().is_some());
    assert!(matches!(
        drain(&mut arx).as_slice(),
        [ServerEvent::Notification { .. }]
    ));

    // The pending request was cleared, so asking again succeeds.
    handlers::social::delete_private_chat_request(&state, &alice, chat_id)
        .await
        .unwrap();
    handlers::social::confirm_delete_private_chat(&state, &bob, chat_id)
        .await
        .unwrap();
    assert!(state.db.get_chat(chat_id).unwrap().is_none());
}

#[tokio::test]
async fn typing_signals_skip_the_typist_and_respect_channel_scope() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;
    let (bob, mut brx) = connect(&state, "bob").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let ack = handlers::channels::add_channel(&state, &alice, chat.id, "talk".into())
        .await
        .unwrap();
    let channel_id: Uuid = serde_json::from_value(ack["channel"]["id"].clone()).unwrap();

    handlers::chats::join_chat_room(&state, &alice, chat.id, Some(channel_id))
        .await
        .unwrap();
    handlers::chats::join_chat_room(&state, &bob, chat.id, Some(channel_id))
        .await
        .unwrap();
    drain(&mut arx);
    drain(&mut brx);

    handlers::activity::typing(&state, &alice, chat.id, channel_id, true)
        .await
        .unwrap();
    assert!(drain(&mut arx).is_empty());
    assert!(matches!(
        drain(&mut brx).as_slice(),
        [ServerEvent::UserTypingStart { .. }]
    ));
}

#[tokio::test]
async fn status_changes_are_not_echoed_to_the_issuer() {
    let state = state();
    let (alice, mut arx) = connect(&state, "alice").await;
    let (_bob, mut brx) = connect(&state, "bob").await;

    handlers::activity::edit_status(&state, &alice, UserStatus::Idle)
        .await
        .unwrap();
    assert!(drain(&mut arx).is_empty());
    assert!(matches!(drain(&mut brx).as_slice(), [ServerEvent::UserIdle { .. }]));

    handlers::activity::edit_status(&state, &alice, UserStatus::Online)
        .await
        .unwrap();
    assert!(drain(&mut arx).is_empty());
    assert!(matches!(drain(&mut brx).as_slice(), [ServerEvent::UserActive { .. }]));
}

#[tokio::test]
async fn delete_chat_is_gated_on_ownership() {
    let state = state();
    let (alice, _arx) = connect(&state, "alice").await;
    let (bob, _brx) = connect(&state, "bob").await;

    let mut chat = create_chat(&state, &alice, "general").await;
    chat.members.push(ChatMember { user_id: bob.user_id, roles: vec![] });
    let (_, version) = state.db.get_chat(chat.id).unwrap().unwrap();
    assert!(state.db.save_chat(&chat, version).unwrap());

    let err = handlers::chats::delete_chat(&state, &bob, chat.id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Only the owner can delete this chat.");

    handlers::chats::delete_chat(&state, &alice, chat.id)
        .await
        .unwrap();
    assert!(state.db.get_chat(chat.id).unwrap().is_none());
}
