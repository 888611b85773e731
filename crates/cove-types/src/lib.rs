pub mod api;
pub mod emoji;
pub mod events;
pub mod models;
pub mod permissions;
