pub mod auth;
pub mod middleware;
pub mod notifications;
pub mod uploads;

use std::path::PathBuf;
use std::sync::Arc;

use cove_auth::KeyStore;
use cove_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub keys: KeyStore,
    pub uploads_dir: PathBuf,
}
