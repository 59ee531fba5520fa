use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use redress_db::Database;
use redress_gateway::dispatcher::Dispatcher;
use redress_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use redress_types::models::{Actor, Claims, Role};

use crate::error::ApiError;
use crate::notify::Sink;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub sink: Sink,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if !req.email.contains('@') || req.email.len() > 255 {
        return Err(ApiError::validation("invalid email address"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    let full_name = req.full_name.trim();
    if full_name.is_empty() || full_name.len() > 120 {
        return Err(ApiError::validation("full name must be 1-120 characters"));
    }

    // Check if email is taken
    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::validation("email already registered"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    state.db.create_user(
        &user_id.to_string(),
        &req.email,
        &password_hash,
        full_name,
        req.student_id.as_deref(),
        req.phone.as_deref(),
    )?;

    let token = create_token(&state.jwt_secret, user_id, full_name)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_email(&req.email)?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.full_name)?;

    Ok(Json(LoginResponse {
        user_id,
        full_name: user.full_name,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, full_name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: full_name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Resolve the acting identity's role set from storage. Called once per
/// request, inside the blocking section that already holds the connection —
/// the resulting `Actor` is the only role cache, so `setRole` is visible to
/// the very next request.
pub(crate) fn load_actor(db: &Database, user_id: Uuid) -> anyhow::Result<Actor> {
    let roles: Vec<Role> = db
        .roles_of(&user_id.to_string())?
        .into_iter()
        .filter_map(|r| Role::parse(&r.role))
        .collect();
    Ok(Actor::new(user_id, roles))
}
