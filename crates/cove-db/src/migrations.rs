use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            doc         TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- A chat is stored as one JSON document (members and roles embedded).
        -- `version` is the optimistic-concurrency counter: saves are
        -- conditional on the version read, so concurrent edits never silently
        -- overwrite each other. `pair_key` is the sorted user-id pair that
        -- makes private-chat creation idempotent.
        CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY,
            doc         TEXT NOT NULL,
            is_private  INTEGER NOT NULL DEFAULT 0,
            pair_key    TEXT UNIQUE,
            version     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            ord         INTEGER NOT NULL,
            name        TEXT NOT NULL,
            topic       TEXT,
            permissions TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_channels_chat
            ON channels(chat_id, ord);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            channel_id  TEXT REFERENCES channels(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            text        TEXT NOT NULL,
            is_edited   INTEGER NOT NULL DEFAULT 0,
            reply_to    TEXT,
            reactions   TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            sender_id    TEXT,
            recipient_id TEXT NOT NULL REFERENCES users(id),
            kind         TEXT NOT NULL,
            message      TEXT,
            link         TEXT,
            read         INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
