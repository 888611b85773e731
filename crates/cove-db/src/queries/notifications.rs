use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use cove_types::models::{Notification, NotificationKind};

use crate::Database;

use super::{conversion_err, sql_time, sql_uuid, sql_uuid_opt};

impl Database {
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications
                    (id, sender_id, recipient_id, kind, message, link, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    notification.id.to_string(),
                    notification.sender.map(|s| s.to_string()),
                    notification.recipient.to_string(),
                    notification.kind.as_str(),
                    &notification.message,
                    &notification.link,
                    notification.read,
                    notification.created_at.to_rfc3339(),
                ),
            )?;
            Ok(())
        })
    }

    /// All notifications owned by `recipient`, newest first.
    pub fn get_notifications(&self, recipient: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, kind, message, link, read, created_at
                 FROM notifications WHERE recipient_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([recipient.to_string()], row_to_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Find the notification a social action originally created, so accept or
    /// decline can consume it.
    pub fn find_notification(
        &self,
        recipient: Uuid,
        sender: Uuid,
        kind: NotificationKind,
    ) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, kind, message, link, read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND kind = ?3
                 ORDER BY created_at DESC LIMIT 1",
            )?;
            let row = stmt
                .query_row(
                    (recipient.to_string(), sender.to_string(), kind.as_str()),
                    row_to_notification,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_notification(&self, id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM notifications WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(3)?;
    let kind = NotificationKind::parse(&kind).ok_or_else(|| {
        conversion_err(
            3,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown notification kind {kind:?}"),
            ),
        )
    })?;
    Ok(Notification {
        id: sql_uuid(0, row.get(0)?)?,
        sender: sql_uuid_opt(1, row.get(1)?)?,
        recipient: sql_uuid(2, row.get(2)?)?,
        kind,
        message: row.get(4)?,
        link: row.get(5)?,
        read: row.get(6)?,
        created_at: sql_time(7, row.get(7)?)?,
    })
}
