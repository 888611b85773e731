use chrono::Utc;
use uuid::Uuid;

use cove_db::Database;
use cove_types::models::{
    Channel, ChannelPermissions, Chat, ChatMember, Message, Notification, NotificationKind,
    Reaction, UserProfile,
};

fn public_chat(owner: Uuid) -> Chat {
    Chat {
        id: Uuid::new_v4(),
        name: "general".into(),
        topic: None,
        thumbnail: None,
        is_private: false,
        members: vec![ChatMember {
            user_id: owner,
            roles: vec!["Owner".into()],
        }],
        roles: vec![],
    }
}

fn channel(chat_id: Uuid, name: &str, order: i64) -> Channel {
    Channel {
        id: Uuid::new_v4(),
        chat_id,
        order,
        name: name.into(),
        topic: None,
        permissions: ChannelPermissions::default(),
    }
}

fn message(chat_id: Uuid, channel_id: Option<Uuid>, sender: Uuid) -> Message {
    Message {
        id: Uuid::new_v4(),
        chat_id,
        channel_id,
        sender,
        text: "hello".into(),
        is_edited: false,
        reply_to: None,
        reactions: vec![],
        created_at: Utc::now(),
    }
}

fn seed_user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(id, name, "hash").unwrap();
    id
}

#[test]
fn user_round_trip_and_profile_save() {
    let db = Database::open_in_memory().unwrap();
    let id = seed_user(&db, "alice");

    let row = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(row.id, id.to_string());
    assert!(db.get_user_by_username("nobody").unwrap().is_none());

    let mut profile = db.get_profile(id).unwrap().unwrap();
    assert!(profile.friends.is_empty());

    let friend = Uuid::new_v4();
    profile.friends.push(friend);
    db.save_profile(id, &profile).unwrap();
    assert_eq!(db.get_profile(id).unwrap().unwrap().friends, vec![friend]);
}

#[test]
fn chat_save_is_version_conditional() {
    let db = Database::open_in_memory().unwrap();
    let owner = seed_user(&db, "alice");
    let chat = public_chat(owner);
    db.insert_chat(&chat).unwrap();

    let (mut first, v1) = db.get_chat(chat.id).unwrap().unwrap();
    let (mut second, v2) = db.get_chat(chat.id).unwrap().unwrap();
    assert_eq!(v1, v2);

    first.topic = Some("ships".into());
    assert!(db.save_chat(&first, v1).unwrap());

    // A save based on the stale read must fail, not overwrite.
    second.topic = Some("anchors".into());
    assert!(!db.save_chat(&second, v2).unwrap());

    let (current, v3) = db.get_chat(chat.id).unwrap().unwrap();
    assert_eq!(current.topic.as_deref(), Some("ships"));
    assert_eq!(v3, v1 + 1);
}

#[test]
fn private_chat_pair_lookup_is_order_insensitive() {
    let db = Database::open_in_memory().unwrap();
    let a = seed_user(&db, "alice");
    let b = seed_user(&db, "bob");

    let chat = Chat {
        id: Uuid::new_v4(),
        name: String::new(),
        topic: None,
        thumbnail: None,
        is_private: true,
        members: vec![
            ChatMember { user_id: a, roles: vec![] },
            ChatMember { user_id: b, roles: vec![] },
        ],
        roles: vec![],
    };
    db.insert_chat(&chat).unwrap();

    assert_eq!(db.find_private_chat(a, b).unwrap().unwrap().id, chat.id);
    assert_eq!(db.find_private_chat(b, a).unwrap().unwrap().id, chat.id);
    assert!(db.find_private_chat(a, Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn channel_order_and_batch_reorder() {
    let db = Database::open_in_memory().unwrap();
    let owner = seed_user(&db, "alice");
    let chat = public_chat(owner);
    db.insert_chat(&chat).unwrap();

    assert_eq!(db.max_channel_order(chat.id).unwrap(), None);

    let lounge = channel(chat.id, "lounge", 0);
    let deck = channel(chat.id, "deck", 1);
    db.insert_channel(&lounge).unwrap();
    db.insert_channel(&deck).unwrap();
    assert_eq!(db.max_channel_order(chat.id).unwrap(), Some(1));

    db.reorder_channels(chat.id, &[(deck.id, 0), (lounge.id, 1)])
        .unwrap();
    let names: Vec<String> = db
        .get_channels(chat.id)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["deck", "lounge"]);
}

#[test]
fn channel_delete_cascades_to_messages() {
    let db = Database::open_in_memory().unwrap();
    let owner = seed_user(&db, "alice");
    let chat = public_chat(owner);
    db.insert_chat(&chat).unwrap();
    let lounge = channel(chat.id, "lounge", 0);
    db.insert_channel(&lounge).unwrap();

    let m1 = message(chat.id, Some(lounge.id), owner);
    let m2 = message(chat.id, Some(lounge.id), owner);
    db.insert_message(&m1).unwrap();
    db.insert_message(&m2).unwrap();

    assert_eq!(db.delete_channel(lounge.id).unwrap(), 2);
    assert!(db.get_channel(lounge.id).unwrap().is_none());
    assert!(db.get_message(m1.id).unwrap().is_none());
}

#[test]
fn chat_delete_cascades() {
    let db = Database::open_in_memory().unwrap();
    let owner = seed_user(&db, "alice");
    let chat = public_chat(owner);
    db.insert_chat(&chat).unwrap();
    let lounge = channel(chat.id, "lounge", 0);
    db.insert_channel(&lounge).unwrap();
    let m = message(chat.id, Some(lounge.id), owner);
    db.insert_message(&m).unwrap();

    db.delete_chat(chat.id).unwrap();
    assert!(db.get_chat(chat.id).unwrap().is_none());
    assert!(db.get_channel(lounge.id).unwrap().is_none());
    assert!(db.get_message(m.id).unwrap().is_none());
}

#[test]
fn message_reactions_round_trip() {
    let db = Database::open_in_memory().unwrap();
    let owner = seed_user(&db, "alice");
    let chat = public_chat(owner);
    db.insert_chat(&chat).unwrap();
    let m = message(chat.id, None, owner);
    db.insert_message(&m).unwrap();

    let reactions = vec![Reaction {
        emoji: "👍".into(),
        users: vec![owner],
    }];
    db.update_message_reactions(m.id, &reactions).unwrap();

    let stored = db.get_message(m.id).unwrap().unwrap();
    assert_eq!(stored.reactions.len(), 1);
    assert_eq!(stored.reactions[0].emoji, "👍");
    assert_eq!(stored.reactions[0].users, vec![owner]);

    db.update_message_text(m.id, "edited").unwrap();
    let stored = db.get_message(m.id).unwrap().unwrap();
    assert_eq!(stored.text, "edited");
    assert!(stored.is_edited);
}

#[test]
fn notification_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");

    let n = Notification {
        id: Uuid::new_v4(),
        sender: Some(alice),
        recipient: bob,
        kind: NotificationKind::FriendRequest,
        message: Some("alice sent you a friend request.".into()),
        link: None,
        read: false,
        created_at: Utc::now(),
    };
    db.insert_notification(&n).unwrap();

    let found = db
        .find_notification(bob, alice, NotificationKind::FriendRequest)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, n.id);
    assert_eq!(db.get_notifications(bob).unwrap().len(), 1);

    db.delete_notification(n.id).unwrap();
    assert!(db
        .find_notification(bob, alice, NotificationKind::FriendRequest)
        .unwrap()
        .is_none());
}

#[test]
fn symmetric_profile_save_is_transactional() {
    let db = Database::open_in_memory().unwrap();
    let a = seed_user(&db, "alice");
    let b = seed_user(&db, "bob");

    let mut pa = UserProfile::default();
    let mut pb = UserProfile::default();
    pa.friends.push(b);
    pb.friends.push(a);
    db.save_profiles(&[(a, &pa), (b, &pb)]).unwrap();

    assert_eq!(db.get_profile(a).unwrap().unwrap().friends, vec![b]);
    assert_eq!(db.get_profile(b).unwrap().unwrap().friends, vec![a]);
}
