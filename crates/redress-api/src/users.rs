use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use redress_policy::access::{self, Action, Decision};
use redress_types::api::{RoleEntry, SetRoleRequest, UserResponse};
use redress_types::models::{Claims, Role};

use crate::auth::{AppState, load_actor};
use crate::error::ApiError;

fn user_response(
    user: redress_db::models::UserRow,
    roles: &HashMap<String, Vec<RoleEntry>>,
) -> Result<UserResponse, ApiError> {
    let id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let user_roles = roles.get(&user.id).cloned().unwrap_or_else(|| {
        // No explicit role rows: the implicit student role.
        vec![RoleEntry {
            role: Role::Student.as_str().to_string(),
            department: None,
        }]
    });
    Ok(UserResponse {
        id,
        email: user.email,
        full_name: user.full_name,
        student_id: user.student_id,
        roles: user_roles,
    })
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = claims.sub;
    let db = state.clone();
    let users = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        if let Decision::Deny(reason) = access::authorize(&actor, Action::ManageUsers, None) {
            return Err(ApiError::Forbidden(reason));
        }

        let mut roles: HashMap<String, Vec<RoleEntry>> = HashMap::new();
        for r in db.db.list_roles()? {
            roles.entry(r.user_id.clone()).or_default().push(RoleEntry {
                role: r.role,
                department: r.department,
            });
        }

        db.db
            .list_users()?
            .into_iter()
            .map(|u| user_response(u, &roles))
            .collect::<Result<Vec<_>, ApiError>>()
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(users))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::validation(format!("unknown role '{}'", req.role)))?;
    if req
        .department
        .as_deref()
        .is_some_and(|d| d.trim().is_empty() || d.len() > 120)
    {
        return Err(ApiError::validation("department must be 1-120 characters"));
    }

    let sub = claims.sub;
    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        let actor = load_actor(&db.db, sub)?;
        if let Decision::Deny(reason) = access::authorize(&actor, Action::ManageUsers, None) {
            return Err(ApiError::Forbidden(reason));
        }
        // Self-lockout guard: an admin cannot rewrite their own grants.
        if user_id == sub {
            return Err(ApiError::Forbidden("admins may not modify their own role"));
        }

        let target = db
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(ApiError::NotFound)?;

        db.db.set_role(
            &Uuid::new_v4().to_string(),
            &user_id.to_string(),
            role.as_str(),
            req.department.as_deref(),
        )?;

        let mut roles: HashMap<String, Vec<RoleEntry>> = HashMap::new();
        for r in db.db.roles_of(&user_id.to_string())? {
            roles.entry(r.user_id.clone()).or_default().push(RoleEntry {
                role: r.role,
                department: r.department,
            });
        }
        user_response(target, &roles)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    info!("role '{}' granted to {}", role.as_str(), user_id);
    Ok(Json(user))
}
