use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use cove_types::models::Chat;

use crate::Database;

/// Canonical lookup key for the private chat between two users: the sorted
/// id pair. Makes lazy private-chat creation idempotent.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

impl Database {
    pub fn insert_chat(&self, chat: &Chat) -> Result<()> {
        let doc = serde_json::to_string(chat)?;
        let pair = if chat.is_private {
            match chat.members.as_slice() {
                [a, b] => Some(pair_key(a.user_id, b.user_id)),
                _ => anyhow::bail!("private chat must have exactly two members"),
            }
        } else {
            None
        };
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chats (id, doc, is_private, pair_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    chat.id.to_string(),
                    doc,
                    chat.is_private,
                    pair,
                    chrono::Utc::now().to_rfc3339(),
                ),
            )?;
            Ok(())
        })
    }

    /// Fetch a chat document together with its current version counter.
    pub fn get_chat(&self, id: Uuid) -> Result<Option<(Chat, i64)>> {
        self.with_conn(|conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT doc, version FROM chats WHERE id = ?1",
                    [id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(doc, version)| Ok((serde_json::from_str(&doc)?, version)))
                .transpose()
        })
    }

    /// Conditional save: succeeds only if nobody else saved since the read.
    /// Returns false on a version conflict so the caller can re-fetch and
    /// retry instead of silently overwriting a concurrent edit.
    pub fn save_chat(&self, chat: &Chat, expected_version: i64) -> Result<bool> {
        let doc = serde_json::to_string(chat)?;
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chats SET doc = ?1, version = version + 1
                 WHERE id = ?2 AND version = ?3",
                (doc, chat.id.to_string(), expected_version),
            )?;
            Ok(changed == 1)
        })
    }

    pub fn find_private_chat(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM chats WHERE pair_key = ?1",
                    [pair_key(a, b)],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
        })
    }

    /// Delete a chat and cascade to its channels and messages, atomically.
    pub fn delete_chat(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [&id])?;
            tx.execute("DELETE FROM channels WHERE chat_id = ?1", [&id])?;
            tx.execute("DELETE FROM chats WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(())
        })
    }
}
