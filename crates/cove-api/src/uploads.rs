use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use cove_types::api::{Claims, UploadResponse};
use cove_types::permissions::{ADMIN, OWNER};

use crate::AppState;

/// 5 MB limit for avatars and thumbnails.
const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

const SAVE_RETRIES: usize = 3;

/// POST /users/avatar — accepts raw image bytes, saves them under the uploads
/// directory and records the public path on the caller's profile.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let public_path = write_image(&state, "avatars", &bytes).await?;

    let db = state.db.clone();
    let user_id = claims.sub;
    let path = public_path.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        let Some(mut profile) = db.get_profile(user_id)? else {
            return Ok(false);
        };
        profile.avatar = Some(path);
        db.save_profile(user_id, &profile)?;
        Ok(true)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("avatar profile update failed: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .then_some(())
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: public_path,
            size: bytes.len() as u64,
        }),
    ))
}

/// POST /chats/{chat_id}/thumbnail — Owner/Admin only; stores the image and
/// saves the path on the chat document through the versioned write path.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let public_path = write_image(&state, "thumbnails", &bytes).await?;

    let db = state.db.clone();
    let user_id = claims.sub;
    let path = public_path.clone();
    let status = tokio::task::spawn_blocking(move || -> anyhow::Result<StatusCode> {
        for _ in 0..SAVE_RETRIES {
            let Some((mut chat, version)) = db.get_chat(chat_id)? else {
                return Ok(StatusCode::NOT_FOUND);
            };
            let Some(member) = chat.member(user_id) else {
                return Ok(StatusCode::FORBIDDEN);
            };
            let allowed = member.roles.iter().any(|r| r == OWNER || r == ADMIN);
            if chat.is_private || !allowed {
                return Ok(StatusCode::FORBIDDEN);
            }
            chat.thumbnail = Some(path.clone());
            if db.save_chat(&chat, version)? {
                return Ok(StatusCode::CREATED);
            }
        }
        anyhow::bail!("persistent version conflict updating chat {chat_id}")
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("thumbnail update failed: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if status != StatusCode::CREATED {
        return Err(status);
    }

    Ok((
        status,
        Json(UploadResponse {
            path: public_path,
            size: bytes.len() as u64,
        }),
    ))
}

/// Write raw image bytes to `<uploads_dir>/<subdir>/<uuid>` and return the
/// path the static file layer serves it under.
async fn write_image(
    state: &AppState,
    subdir: &str,
    bytes: &Bytes,
) -> Result<String, StatusCode> {
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let file_id = Uuid::new_v4();
    let dir = state.uploads_dir.join(subdir);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("failed to create {}: {e}", dir.display());
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let file_path = dir.join(file_id.to_string());
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("failed to create {}: {e}", file_path.display());
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    file.write_all(bytes).await.map_err(|e| {
        error!("failed to write {}: {e}", file_path.display());
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(format!("/uploads/{subdir}/{file_id}"))
}
