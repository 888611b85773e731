use std::sync::Arc;

use cove_db::Database;

use crate::presence::PresenceTracker;
use crate::registry::RoomRegistry;

/// Everything a gateway handler needs: the persistent store plus the two
/// process-wide live registries. Constructed once in main and cloned into
/// every connection; tearing down the last clone tears down the registries.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub registry: RoomRegistry,
    pub presence: PresenceTracker,
}

impl GatewayState {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            registry: RoomRegistry::new(),
            presence: PresenceTracker::new(),
        }
    }
}
