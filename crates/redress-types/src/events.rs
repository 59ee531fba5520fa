use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Status;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, full_name: String },

    /// A new message was appended to a complaint thread
    MessageCreate {
        id: Uuid,
        complaint_id: Uuid,
        author_id: Uuid,
        author_name: String,
        is_staff: bool,
        body: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A complaint moved to a new lifecycle status
    StatusUpdate {
        complaint_id: Uuid,
        status: Status,
        changed_by: Option<Uuid>,
        note: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An in-app notification was created for the receiving user.
    /// Always delivered over the per-user channel, never broadcast.
    NotificationCreate {
        id: Uuid,
        complaint_id: Option<Uuid>,
        kind: String,
        title: String,
        body: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GatewayEvent {
    /// Returns the complaint_id if this event is scoped to one complaint.
    /// Scoped events are only forwarded to connections subscribed to that
    /// complaint; `None` means the event is connection-targeted or global.
    pub fn complaint_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { complaint_id, .. } => Some(*complaint_id),
            Self::StatusUpdate { complaint_id, .. } => Some(*complaint_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific complaints. Each id is authorized
    /// against the access matrix; ids the caller may not view are dropped.
    Subscribe { complaint_ids: Vec<Uuid> },

    /// Stop receiving events for the given complaints
    Unsubscribe { complaint_ids: Vec<Uuid> },
}
