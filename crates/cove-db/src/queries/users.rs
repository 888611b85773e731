use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use cove_types::models::UserProfile;

use crate::Database;
use crate::models::UserRow;

impl Database {
    pub fn create_user(&self, id: Uuid, username: &str, password_hash: &str) -> Result<()> {
        let doc = serde_json::to_string(&UserProfile::default())?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, doc) VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), username, password_hash, doc),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id.to_string()))
    }

    pub fn get_username(&self, id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT username FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| Ok(serde_json::from_str(&d)?)).transpose()
        })
    }

    pub fn save_profile(&self, id: Uuid, profile: &UserProfile) -> Result<()> {
        let doc = serde_json::to_string(profile)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET doc = ?1 WHERE id = ?2",
                (doc, id.to_string()),
            )?;
            Ok(())
        })
    }

    /// Save several profiles in one transaction. Symmetric relations (friend
    /// accept/remove, bans) go through here so both sides land or neither.
    pub fn save_profiles(&self, profiles: &[(Uuid, &UserProfile)]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for (id, profile) in profiles {
                let doc = serde_json::to_string(profile)?;
                tx.execute(
                    "UPDATE users SET doc = ?1 WHERE id = ?2",
                    (doc, id.to_string()),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, filter: &str, param: &str) -> Result<Option<UserRow>> {
    let sql =
        format!("SELECT id, username, password, doc, created_at FROM users WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([param], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                doc: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}
