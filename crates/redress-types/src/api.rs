use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, Priority, Status};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub student_id: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub full_name: String,
    pub token: String,
}

// -- Complaints --

/// `category`, `priority` and `status` cross the wire as plain strings and are
/// parsed server-side so an unknown value yields a validation error instead of
/// a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CreateComplaintRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub location: Option<String>,
    pub incident_date: Option<String>,
}

/// Owner identity fields, attached to a complaint view only when the
/// anonymity projection allows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterProfile {
    pub full_name: String,
    pub email: String,
    pub student_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComplaintResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub is_anonymous: bool,
    /// Redacted to `None` for every non-owner view of an anonymous complaint.
    pub reporter: Option<ReporterProfile>,
    pub assigned_to: Option<Uuid>,
    pub location: Option<String>,
    pub incident_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusHistoryEntryResponse {
    pub status: Status,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComplaintDetailResponse {
    #[serde(flatten)]
    pub complaint: ComplaintResponse,
    pub history: Vec<StatusHistoryEntryResponse>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assignee: Uuid,
}

// -- Messages --

/// Unknown fields are accepted and dropped on purpose: a payload carrying
/// `is_staff` must not fail, and must never influence the stored flag,
/// which is derived from the author's role set at write time.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub is_staff: bool,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub complaint_id: Option<Uuid>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// -- User management --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    pub role: String,
    pub department: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub student_id: Option<String>,
    pub roles: Vec<RoleEntry>,
}
