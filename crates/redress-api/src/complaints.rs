use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use redress_db::models::{ComplaintRow, HistoryRow, UserRow};
use redress_policy::access::{self, Action, ComplaintAccess, Decision};
use redress_policy::lifecycle;
use redress_types::api::{
    AssignRequest, ComplaintDetailResponse, ComplaintResponse, CreateComplaintRequest,
    ReporterProfile, StatusHistoryEntryResponse, TransitionRequest,
};
use redress_types::events::GatewayEvent;
use redress_types::models::{Actor, Category, Claims, Priority, Status};

use crate::auth::{AppState, load_actor};
use crate::error::ApiError;
use crate::notify;
use crate::{parse_opt_ts, parse_ts};

pub(crate) fn access_of(row: &ComplaintRow) -> Result<ComplaintAccess, ApiError> {
    let owner: Uuid = row
        .user_id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt owner id '{}': {}", row.user_id, e))?;
    Ok(ComplaintAccess {
        owner,
        is_anonymous: row.is_anonymous,
    })
}

/// Build the outward view of a complaint for `viewer`. The reporter block is
/// attached only when the anonymity projection allows it; `owner` is the
/// pre-fetched user row (callers skip the fetch when redaction applies).
pub(crate) fn complaint_response(
    row: &ComplaintRow,
    viewer: &Actor,
    owner: Option<&UserRow>,
) -> Result<ComplaintResponse, ApiError> {
    let target = access_of(row)?;
    let reporter = if access::can_see_reporter(viewer, &target) {
        owner.map(|u| ReporterProfile {
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            student_id: u.student_id.clone(),
        })
    } else {
        None
    };

    Ok(ComplaintResponse {
        id: row
            .id
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt complaint id '{}': {}", row.id, e))?,
        title: row.title.clone(),
        description: row.description.clone(),
        category: Category::parse(&row.category)
            .ok_or_else(|| anyhow::anyhow!("corrupt category '{}'", row.category))?,
        priority: Priority::parse(&row.priority)
            .ok_or_else(|| anyhow::anyhow!("corrupt priority '{}'", row.priority))?,
        status: Status::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("corrupt status '{}'", row.status))?,
        is_anonymous: row.is_anonymous,
        reporter,
        assigned_to: row.assigned_to.as_deref().and_then(|s| s.parse().ok()),
        location: row.location.clone(),
        incident_date: row.incident_date.clone(),
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
        escalated_at: parse_opt_ts(row.escalated_at.as_deref()),
        resolved_at: parse_opt_ts(row.resolved_at.as_deref()),
    })
}

fn history_response(row: HistoryRow) -> Result<StatusHistoryEntryResponse, ApiError> {
    Ok(StatusHistoryEntryResponse {
        status: Status::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("corrupt history status '{}'", row.status))?,
        changed_by: row.changed_by.as_deref().and_then(|s| s.parse().ok()),
        notes: row.notes,
        created_at: parse_ts(&row.created_at),
    })
}

pub async fn create_complaint(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateComplaintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.len() < 5 || title.len() > 200 {
        return Err(ApiError::validation("title must be 5-200 characters"));
    }
    let description = req.description.trim().to_string();
    if description.len() < 20 || description.len() > 5000 {
        return Err(ApiError::validation("description must be 20-5000 characters"));
    }
    let category = Category::parse(&req.category)
        .ok_or_else(|| ApiError::validation(format!("unknown category '{}'", req.category)))?;
    let priority = match req.priority.as_deref() {
        None => Priority::Medium,
        Some(p) => Priority::parse(p)
            .ok_or_else(|| ApiError::validation(format!("unknown priority '{p}'")))?,
    };

    let complaint_id = Uuid::new_v4();
    let history_id = Uuid::new_v4();
    let sub = claims.sub;

    let db = state.clone();
    let response = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        if let Decision::Deny(reason) = access::authorize(&actor, Action::Create, None) {
            return Err(ApiError::Forbidden(reason));
        }

        db.db.create_complaint(
            &complaint_id.to_string(),
            &history_id.to_string(),
            &sub.to_string(),
            &title,
            &description,
            category.as_str(),
            priority.as_str(),
            req.is_anonymous,
            req.location.as_deref(),
            req.incident_date.as_deref(),
        )?;

        let row = db
            .db
            .get_complaint(&complaint_id.to_string())?
            .ok_or_else(|| anyhow::anyhow!("complaint missing after insert"))?;
        let owner = db.db.get_user_by_id(&sub.to_string())?;
        complaint_response(&row, &actor, owner.as_ref())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    info!("complaint {} submitted", complaint_id);
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// `mine` restricts to own filings; `all` requires a staff-tier role.
    /// Absent, the scope follows the actor's role.
    pub scope: Option<String>,
}

pub async fn list_complaints(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let responses = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let want_all = match query.scope.as_deref() {
            None => actor.is_staff_tier(),
            Some("mine") => false,
            Some("all") => {
                if !actor.is_staff_tier() {
                    return Err(ApiError::Forbidden("insufficient role"));
                }
                true
            }
            Some(other) => {
                return Err(ApiError::validation(format!("unknown scope '{other}'")));
            }
        };
        let rows = if want_all {
            db.db.list_complaints_all()?
        } else {
            db.db.list_complaints_for_user(&sub.to_string())?
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let target = access_of(row)?;
            let owner = if access::can_see_reporter(&actor, &target) {
                db.db.get_user_by_id(&row.user_id)?
            } else {
                None
            };
            out.push(complaint_response(row, &actor, owner.as_ref())?);
        }
        Ok::<_, ApiError>(out)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(responses))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let detail = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let target = access_of(&row)?;
        // Denied reads report as missing so existence never leaks.
        if !access::authorize(&actor, Action::View, Some(&target)).is_allow() {
            return Err(ApiError::NotFound);
        }

        let owner = if access::can_see_reporter(&actor, &target) {
            db.db.get_user_by_id(&row.user_id)?
        } else {
            None
        };
        let complaint = complaint_response(&row, &actor, owner.as_ref())?;
        let history = db
            .db
            .get_history(&id.to_string())?
            .into_iter()
            .map(history_response)
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok::<_, ApiError>(ComplaintDetailResponse { complaint, history })
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(detail))
}

pub async fn transition_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_status = Status::parse(&req.status)
        .ok_or_else(|| ApiError::validation(format!("unknown status '{}'", req.status)))?;
    if req.note.as_deref().is_some_and(|n| n.len() > 1000) {
        return Err(ApiError::validation("note must be at most 1000 characters"));
    }

    let sub = claims.sub;
    let note = req.note.clone();
    let db = state.clone();
    let (response, row) = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let target = access_of(&row)?;

        let action = if new_status == Status::Escalated {
            Action::Escalate
        } else {
            Action::UpdateStatus
        };
        if let Decision::Deny(reason) = access::authorize(&actor, action, Some(&target)) {
            return Err(ApiError::Forbidden(reason));
        }

        let current = Status::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("corrupt status '{}'", row.status))?;
        lifecycle::validate_transition(current, new_status)?;

        let history_id = Uuid::new_v4();
        let applied = db.db.transition_complaint(
            &id.to_string(),
            &history_id.to_string(),
            current.as_str(),
            new_status.as_str(),
            &sub.to_string(),
            note.as_deref(),
            new_status == Status::Escalated,
            new_status == Status::Resolved,
        )?;
        if !applied {
            // Another transition committed between our read and write; the
            // caller re-fetches and retries against the new state.
            return Err(ApiError::Conflict);
        }

        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or_else(|| anyhow::anyhow!("complaint missing after transition"))?;
        let owner = if access::can_see_reporter(&actor, &target) {
            db.db.get_user_by_id(&row.user_id)?
        } else {
            None
        };
        let response = complaint_response(&row, &actor, owner.as_ref())?;
        Ok::<_, ApiError>((response, row))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    info!("complaint {} moved to {}", id, new_status.as_str());

    state.dispatcher.broadcast(GatewayEvent::StatusUpdate {
        complaint_id: id,
        status: new_status,
        changed_by: Some(sub),
        note: req.note.clone(),
        timestamp: chrono::Utc::now(),
    });

    // Best-effort: a transition that fails to notify is still a transition.
    if let Err(e) = notify::status_changed(&state, &row, new_status, req.note.as_deref()).await {
        warn!("status notification dropped: {}", e);
    }

    Ok(Json(response))
}

pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let response = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let target = access_of(&row)?;
        if let Decision::Deny(reason) = access::authorize(&actor, Action::Assign, Some(&target)) {
            return Err(ApiError::Forbidden(reason));
        }

        if db.db.get_user_by_id(&req.assignee.to_string())?.is_none() {
            return Err(ApiError::validation("assignee does not exist"));
        }
        let assignee = load_actor(&db.db, req.assignee)?;
        if !assignee.is_staff_tier() {
            return Err(ApiError::validation("assignee does not hold a staff role"));
        }

        db.db
            .assign_complaint(&id.to_string(), &req.assignee.to_string())?;

        let row = db
            .db
            .get_complaint(&id.to_string())?
            .ok_or_else(|| anyhow::anyhow!("complaint missing after assign"))?;
        let owner = if access::can_see_reporter(&actor, &target) {
            db.db.get_user_by_id(&row.user_id)?
        } else {
            None
        };
        complaint_response(&row, &actor, owner.as_ref())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(response))
}
