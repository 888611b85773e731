use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use cove_types::models::Channel;

use crate::Database;

use super::{sql_json, sql_uuid};

impl Database {
    pub fn insert_channel(&self, channel: &Channel) -> Result<()> {
        let permissions = serde_json::to_string(&channel.permissions)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO channels (id, chat_id, ord, name, topic, permissions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    channel.id.to_string(),
                    channel.chat_id.to_string(),
                    channel.order,
                    &channel.name,
                    &channel.topic,
                    permissions,
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, ord, name, topic, permissions
                 FROM channels WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id.to_string()], row_to_channel)
                .optional()?;
            Ok(row)
        })
    }

    /// All channels of a chat, in display order.
    pub fn get_channels(&self, chat_id: Uuid) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, ord, name, topic, permissions
                 FROM channels WHERE chat_id = ?1 ORDER BY ord, created_at",
            )?;
            let rows = stmt
                .query_map([chat_id.to_string()], row_to_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn max_channel_order(&self, chat_id: Uuid) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(ord) FROM channels WHERE chat_id = ?1",
                [chat_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(max)
        })
    }

    pub fn update_channel(&self, channel: &Channel) -> Result<()> {
        let permissions = serde_json::to_string(&channel.permissions)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE channels SET name = ?1, topic = ?2, permissions = ?3 WHERE id = ?4",
                (
                    &channel.name,
                    &channel.topic,
                    permissions,
                    channel.id.to_string(),
                ),
            )?;
            Ok(())
        })
    }

    /// Apply a full reorder as one batch; either every order lands or none.
    pub fn reorder_channels(&self, chat_id: Uuid, orders: &[(Uuid, i64)]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for (channel_id, ord) in orders {
                tx.execute(
                    "UPDATE channels SET ord = ?1 WHERE id = ?2 AND chat_id = ?3",
                    (ord, channel_id.to_string(), chat_id.to_string()),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete a channel and its messages atomically. Returns the number of
    /// messages removed by the cascade.
    pub fn delete_channel(&self, id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();
            let messages = tx.execute("DELETE FROM messages WHERE channel_id = ?1", [&id])?;
            tx.execute("DELETE FROM channels WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(messages)
        })
    }
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: sql_uuid(0, row.get(0)?)?,
        chat_id: sql_uuid(1, row.get(1)?)?,
        order: row.get(2)?,
        name: row.get(3)?,
        topic: row.get(4)?,
        permissions: sql_json(5, row.get(5)?)?,
    })
}
