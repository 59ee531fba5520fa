use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use redress_types::api::NotificationResponse;
use redress_types::models::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_ts;

/// The feed is implicitly scoped to the caller; there is no way to read
/// another user's notifications.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let notifications = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_notifications(&sub.to_string())?;
        let mut out = Vec::with_capacity(rows.len());
        for n in rows {
            out.push(NotificationResponse {
                id: n
                    .id
                    .parse()
                    .map_err(|e| anyhow::anyhow!("corrupt notification id '{}': {}", n.id, e))?,
                complaint_id: n.complaint_id.as_deref().and_then(|s| s.parse().ok()),
                kind: n.kind,
                title: n.title,
                body: n.body,
                is_read: n.is_read,
                created_at: parse_ts(&n.created_at),
            });
        }
        Ok::<_, ApiError>(out)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(notifications))
}

/// Read-flag mutation, recipient only. A notification belonging to someone
/// else reports as missing.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let marked = tokio::task::spawn_blocking(move || {
        Ok::<_, ApiError>(
            db.db
                .mark_notification_read(&id.to_string(), &sub.to_string())?,
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    if !marked {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
