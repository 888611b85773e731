use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::error;

use cove_types::api::Claims;
use cove_types::models::Notification;

use crate::AppState;

/// GET /notifications — everything pending for the caller, newest first, so
/// a client coming online can catch up on what it missed.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let db = state.db.clone();
    let recipient = claims.sub;
    let notifications = tokio::task::spawn_blocking(move || db.get_notifications(recipient))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("notification listing failed: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(notifications))
}
