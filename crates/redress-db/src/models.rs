/// Database row types — these map directly to SQLite rows.
/// Distinct from redress-types API models to keep the DB layer independent;
/// enum and timestamp decoding happens at the API boundary.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub student_id: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
}

pub struct RoleRow {
    pub user_id: String,
    pub role: String,
    pub department: Option<String>,
}

pub struct ComplaintRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub is_anonymous: bool,
    pub assigned_to: Option<String>,
    pub location: Option<String>,
    pub incident_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub escalated_at: Option<String>,
    pub resolved_at: Option<String>,
}

pub struct HistoryRow {
    pub status: String,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub complaint_id: String,
    pub user_id: String,
    pub author_name: String,
    pub is_staff: bool,
    pub body: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub complaint_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}
