use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared across redress-api (REST middleware) and redress-gateway
/// (WebSocket authentication). Canonical definition lives here in redress-types
/// to eliminate duplication.
///
/// Roles are deliberately absent: they are re-read from storage on every
/// request so a role change takes effect without re-issuing the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Hod,
    Admin,
    Grc,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Hod => "hod",
            Role::Admin => "admin",
            Role::Grc => "grc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "hod" => Some(Role::Hod),
            "admin" => Some(Role::Admin),
            "grc" => Some(Role::Grc),
            _ => None,
        }
    }

    /// Roles allowed to work complaints they do not own.
    pub fn is_staff_tier(&self) -> bool {
        matches!(self, Role::Staff | Role::Hod | Role::Admin | Role::Grc)
    }
}

/// A role grant, optionally scoped to a department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: Role,
    pub department: Option<String>,
}

/// The verified identity attempting an action, with its resolved role set.
///
/// Multi-role membership is a set, never a single field: a user can hold
/// `staff` and `hod` simultaneously, and checks test membership.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub roles: HashSet<Role>,
}

impl Actor {
    pub fn new(id: Uuid, roles: impl IntoIterator<Item = Role>) -> Self {
        let mut roles: HashSet<Role> = roles.into_iter().collect();
        // A user with no explicit role rows is implicitly a student.
        if roles.is_empty() {
            roles.insert(Role::Student);
        }
        Self { id, roles }
    }

    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_staff_tier(&self) -> bool {
        self.roles.iter().any(Role::is_staff_tier)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Role::Admin)
    }
}

// -- Complaint enums --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Academic,
    Hostel,
    Canteen,
    Harassment,
    Infrastructure,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Academic => "Academic",
            Category::Hostel => "Hostel",
            Category::Canteen => "Canteen",
            Category::Harassment => "Harassment",
            Category::Infrastructure => "Infrastructure",
            Category::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Academic" => Some(Category::Academic),
            "Hostel" => Some(Category::Hostel),
            "Canteen" => Some(Category::Canteen),
            "Harassment" => Some(Category::Harassment),
            "Infrastructure" => Some(Category::Infrastructure),
            "Other" => Some(Category::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(Priority::Low),
            "Medium" => Some(Priority::Medium),
            "High" => Some(Priority::High),
            "Critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Complaint lifecycle status. The wire and storage form uses the
/// human-readable names ("In Review", not "InReview").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Submitted,
    #[serde(rename = "In Review")]
    InReview,
    #[serde(rename = "In Progress")]
    InProgress,
    Escalated,
    Resolved,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Submitted => "Submitted",
            Status::InReview => "In Review",
            Status::InProgress => "In Progress",
            Status::Escalated => "Escalated",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Submitted" => Some(Status::Submitted),
            "In Review" => Some(Status::InReview),
            "In Progress" => Some(Status::InProgress),
            "Escalated" => Some(Status::Escalated),
            "Resolved" => Some(Status::Resolved),
            "Closed" => Some(Status::Closed),
            _ => None,
        }
    }
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StatusUpdate,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::StatusUpdate => "status_update",
            NotificationKind::NewMessage => "new_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display_names() {
        for s in [
            Status::Submitted,
            Status::InReview,
            Status::InProgress,
            Status::Escalated,
            Status::Resolved,
            Status::Closed,
        ] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
        assert_eq!(Status::parse("InReview"), None);
    }

    #[test]
    fn actor_without_role_rows_is_a_student() {
        let actor = Actor::new(Uuid::new_v4(), []);
        assert!(actor.has(Role::Student));
        assert!(!actor.is_staff_tier());
    }

    #[test]
    fn multi_role_actor_tests_membership() {
        let actor = Actor::new(Uuid::new_v4(), [Role::Staff, Role::Hod]);
        assert!(actor.has(Role::Staff));
        assert!(actor.has(Role::Hod));
        assert!(actor.is_staff_tier());
        assert!(!actor.is_admin());
    }
}
