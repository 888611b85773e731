use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use cove_types::models::{Message, Reaction};

use crate::Database;

use super::{sql_json, sql_time, sql_uuid, sql_uuid_opt};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let reactions = serde_json::to_string(&message.reactions)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, chat_id, channel_id, sender_id, text, is_edited, reply_to, reactions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                (
                    message.id.to_string(),
                    message.chat_id.to_string(),
                    message.channel_id.map(|c| c.to_string()),
                    message.sender.to_string(),
                    &message.text,
                    message.is_edited,
                    message.reply_to.map(|m| m.to_string()),
                    reactions,
                    message.created_at.to_rfc3339(),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, channel_id, sender_id, text, is_edited, reply_to, reactions, created_at
                 FROM messages WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id.to_string()], row_to_message)
                .optional()?;
            Ok(row)
        })
    }

    /// Most recent messages of a chat, newest first.
    pub fn get_messages(&self, chat_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, channel_id, sender_id, text, is_edited, reply_to, reactions, created_at
                 FROM messages WHERE chat_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![chat_id.to_string(), limit], row_to_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_message_text(&self, id: Uuid, text: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET text = ?1, is_edited = 1 WHERE id = ?2",
                (text, id.to_string()),
            )?;
            Ok(())
        })
    }

    pub fn update_message_reactions(&self, id: Uuid, reactions: &[Reaction]) -> Result<()> {
        let doc = serde_json::to_string(reactions)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET reactions = ?1 WHERE id = ?2",
                (doc, id.to_string()),
            )?;
            Ok(())
        })
    }

    pub fn delete_message(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: sql_uuid(0, row.get(0)?)?,
        chat_id: sql_uuid(1, row.get(1)?)?,
        channel_id: sql_uuid_opt(2, row.get(2)?)?,
        sender: sql_uuid(3, row.get(3)?)?,
        text: row.get(4)?,
        is_edited: row.get(5)?,
        reply_to: sql_uuid_opt(6, row.get(6)?)?,
        reactions: sql_json(7, row.get(7)?)?,
        created_at: sql_time(8, row.get(8)?)?,
    })
}
