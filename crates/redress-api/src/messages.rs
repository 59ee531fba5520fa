use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use redress_policy::access::{self, Action};
use redress_types::api::{MessageResponse, PostMessageRequest};
use redress_types::events::GatewayEvent;
use redress_types::models::Claims;

use crate::auth::{AppState, load_actor};
use crate::complaints::access_of;
use crate::error::ApiError;
use crate::notify;
use crate::parse_ts;

/// Maximum message body length, in characters, after trimming.
pub const MAX_MESSAGE_LEN: usize = 2000;

pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::validation("message body is empty"));
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::validation(format!(
            "message body exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }

    let message_id = Uuid::new_v4();
    let sub = claims.sub;

    let db = state.clone();
    let body_for_insert = body.clone();
    let (row, is_staff) = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let target = access_of(&row)?;
        if !access::authorize(&actor, Action::Message, Some(&target)).is_allow() {
            return Err(ApiError::NotFound);
        }

        // The staff flag comes from the actor's role set at write time; a
        // flag in the payload is ignored by deserialization.
        let is_staff = actor.is_staff_tier();

        db.db.insert_message(
            &message_id.to_string(),
            &id.to_string(),
            &sub.to_string(),
            is_staff,
            &body_for_insert,
        )?;

        Ok::<_, ApiError>((row, is_staff))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let now = chrono::Utc::now();

    // Owner-authored messages on an anonymous complaint fan out without the
    // author's display name; the author still sees their own name in the
    // direct response.
    let owner_authored = row.user_id == sub.to_string();
    let broadcast_name = if row.is_anonymous && owner_authored {
        "Anonymous".to_string()
    } else {
        claims.name.clone()
    };

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message_id,
        complaint_id: id,
        author_id: sub,
        author_name: broadcast_name,
        is_staff,
        body: body.clone(),
        timestamp: now,
    });

    if let Err(e) = notify::message_posted(&state, &row, sub, &body).await {
        warn!("message notification dropped: {}", e);
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            complaint_id: id,
            author_id: sub,
            author_name: claims.name.clone(),
            is_staff,
            body,
            created_at: now,
        }),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let messages = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let target = access_of(&row)?;
        if !access::authorize(&actor, Action::View, Some(&target)).is_allow() {
            return Err(ApiError::NotFound);
        }

        let rows = db.db.list_messages(&id.to_string())?;
        let mut out = Vec::with_capacity(rows.len());
        for m in rows {
            let author_id: Uuid = m
                .user_id
                .parse()
                .map_err(|e| anyhow::anyhow!("corrupt author id '{}': {}", m.user_id, e))?;
            let owner_authored = m.user_id == row.user_id;
            let author_name = if row.is_anonymous && owner_authored && author_id != sub {
                "Anonymous".to_string()
            } else {
                m.author_name
            };
            out.push(MessageResponse {
                id: m
                    .id
                    .parse()
                    .map_err(|e| anyhow::anyhow!("corrupt message id '{}': {}", m.id, e))?,
                complaint_id: id,
                author_id,
                author_name,
                is_staff: m.is_staff,
                body: m.body,
                created_at: parse_ts(&m.created_at),
            });
        }
        Ok::<_, ApiError>(out)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(messages))
}
