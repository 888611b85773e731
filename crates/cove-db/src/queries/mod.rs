mod channels;
mod chats;
mod messages;
mod notifications;
mod users;

pub use chats::pair_key;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn sql_uuid(idx: usize, value: String) -> rusqlite::Result<Uuid> {
    value.parse().map_err(|e| conversion_err(idx, e))
}

pub(crate) fn sql_uuid_opt(idx: usize, value: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    value.map(|v| sql_uuid(idx, v)).transpose()
}

pub(crate) fn sql_json<T: DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn sql_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}
