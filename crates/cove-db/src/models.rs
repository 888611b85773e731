/// Database row types — these map directly to SQLite rows. Everything else
/// (chats, channels, messages, notifications) is parsed straight into the
/// cove-types models by the query layer.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub doc: String,
    pub created_at: String,
}
