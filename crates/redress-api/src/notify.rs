//! Notification dispatch: persist the in-app record synchronously with the
//! triggering action, then hand the outbound copy to the external sink on a
//! background task. The notifications table is the system of record; sink
//! failures are logged and never fail the triggering action.

use std::collections::BTreeSet;

use tracing::{debug, error};
use uuid::Uuid;

use redress_db::models::ComplaintRow;
use redress_types::events::GatewayEvent;
use redress_types::models::{NotificationKind, Role, Status};

use crate::auth::AppState;
use crate::error::ApiError;

const MAX_ID_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 500;
const MAX_BODY_LEN: usize = 2000;

/// Outbound delivery endpoint. With no endpoint configured the sink is a
/// no-op, which is what the test suites and local development run with.
#[derive(Clone)]
pub struct Sink {
    client: reqwest::Client,
    endpoint: Option<String>,
    from: String,
}

impl Sink {
    pub fn new(endpoint: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "redress@localhost".to_string())
    }

    /// POST one rendered notification. All user-supplied text is escaped
    /// here, at the rendering boundary, so nothing upstream can inject
    /// markup into the payload.
    pub async fn deliver(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let Some(endpoint) = &self.endpoint else {
            debug!("notification sink disabled, skipping delivery to {}", recipient);
            return Ok(());
        };

        let subject = escape_html(subject);
        let html = format!(
            "<div style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h2>{}</h2><p>{}</p>\
             <p>Log in to the grievance portal to view the complaint and track its progress.</p>\
             </div>",
            subject,
            escape_html(body),
        );

        let payload = serde_json::json!({
            "from": self.from,
            "to": [recipient],
            "subject": subject,
            "html": html,
        });

        self.client
            .post(endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// HTML escape to keep user text inert in rendered payloads.
pub fn escape_html(unsafe_text: &str) -> String {
    unsafe_text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

fn validate_event(
    recipient: &str,
    complaint_id: Option<&str>,
    title: &str,
    body: &str,
) -> Result<(), ApiError> {
    if recipient.is_empty() || recipient.len() > MAX_ID_LEN {
        return Err(ApiError::InvalidNotification("invalid recipient id".into()));
    }
    if complaint_id.is_some_and(|c| c.is_empty() || c.len() > MAX_ID_LEN) {
        return Err(ApiError::InvalidNotification("invalid complaint id".into()));
    }
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(ApiError::InvalidNotification("invalid title".into()));
    }
    if body.is_empty() || body.len() > MAX_BODY_LEN {
        return Err(ApiError::InvalidNotification("invalid body".into()));
    }
    Ok(())
}

/// Who hears about a new message. Owner-authored messages go to the
/// assignee when one is set, else to the whole staff pool; staff-authored
/// messages go to the owner. The author never notifies themselves.
fn message_recipients(
    author: Uuid,
    owner: Uuid,
    assignee: Option<Uuid>,
    staff_pool: &[Uuid],
) -> Vec<Uuid> {
    if author == owner {
        if let Some(a) = assignee {
            if a != author {
                return vec![a];
            }
        }
        staff_pool.iter().copied().filter(|&u| u != author).collect()
    } else {
        vec![owner]
    }
}

struct PersistedNotification {
    id: Uuid,
    recipient: Uuid,
    email: Option<String>,
    complaint_id: Option<Uuid>,
    kind: NotificationKind,
    title: String,
    body: String,
}

/// Write one notification row per recipient, then push the in-app event and
/// queue outbound delivery. The rows are written before this returns;
/// delivery happens on detached tasks.
async fn persist_and_deliver(
    state: &AppState,
    recipients: Vec<Uuid>,
    complaint_id: Option<Uuid>,
    kind: NotificationKind,
    title: String,
    body: String,
) -> Result<(), ApiError> {
    let complaint_ref = complaint_id.map(|c| c.to_string());
    for recipient in &recipients {
        validate_event(&recipient.to_string(), complaint_ref.as_deref(), &title, &body)?;
    }

    let db = state.clone();
    let title_db = title.clone();
    let body_db = body.clone();
    let created = tokio::task::spawn_blocking(move || {
        let mut created = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let id = Uuid::new_v4();
            db.db.insert_notification(
                &id.to_string(),
                &recipient.to_string(),
                complaint_id.map(|c| c.to_string()).as_deref(),
                kind.as_str(),
                &title_db,
                &body_db,
            )?;
            let email = db
                .db
                .get_user_by_id(&recipient.to_string())?
                .map(|u| u.email);
            created.push(PersistedNotification {
                id,
                recipient,
                email,
                complaint_id,
                kind,
                title: title_db.clone(),
                body: body_db.clone(),
            });
        }
        Ok::<_, ApiError>(created)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let now = chrono::Utc::now();
    for n in created {
        let PersistedNotification {
            id,
            recipient,
            email,
            complaint_id,
            kind,
            title,
            body,
        } = n;

        state
            .dispatcher
            .send_to_user(
                recipient,
                GatewayEvent::NotificationCreate {
                    id,
                    complaint_id,
                    kind: kind.as_str().to_string(),
                    title: title.clone(),
                    body: body.clone(),
                    timestamp: now,
                },
            )
            .await;

        if let Some(email) = email {
            let sink = state.sink.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&email, &title, &body).await {
                    error!("{} for {}: {:#}", ApiError::DeliveryFailed, recipient, e);
                }
            });
        }
    }

    Ok(())
}

/// Lifecycle event: tell the owner their complaint moved.
pub async fn status_changed(
    state: &AppState,
    complaint: &ComplaintRow,
    new_status: Status,
    note: Option<&str>,
) -> Result<(), ApiError> {
    let owner: Uuid = complaint
        .user_id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt owner id '{}': {}", complaint.user_id, e))?;
    let complaint_id: Uuid = complaint
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt complaint id '{}': {}", complaint.id, e))?;

    let title = "Complaint status updated".to_string();
    let mut body = format!(
        "Your complaint \"{}\" is now {}.",
        complaint.title,
        new_status.as_str()
    );
    if let Some(note) = note {
        body.push_str(" Note: ");
        body.push_str(note);
    }

    persist_and_deliver(
        state,
        vec![owner],
        Some(complaint_id),
        NotificationKind::StatusUpdate,
        title,
        body,
    )
    .await
}

/// Messaging event: notify the counterparty of a new thread message.
pub async fn message_posted(
    state: &AppState,
    complaint: &ComplaintRow,
    author: Uuid,
    message_body: &str,
) -> Result<(), ApiError> {
    let owner: Uuid = complaint
        .user_id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt owner id '{}': {}", complaint.user_id, e))?;
    let complaint_id: Uuid = complaint
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt complaint id '{}': {}", complaint.id, e))?;
    let assignee = complaint.assigned_to.as_deref().and_then(|s| s.parse().ok());

    let staff_pool: Vec<Uuid> = if author == owner {
        let db = state.clone();
        tokio::task::spawn_blocking(move || {
            let pool: BTreeSet<Uuid> = db
                .db
                .list_roles()?
                .into_iter()
                .filter(|r| Role::parse(&r.role).is_some_and(|role| role.is_staff_tier()))
                .filter_map(|r| r.user_id.parse().ok())
                .collect();
            Ok::<_, ApiError>(pool.into_iter().collect())
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??
    } else {
        Vec::new()
    };

    let recipients = message_recipients(author, owner, assignee, &staff_pool);
    if recipients.is_empty() {
        return Ok(());
    }

    let excerpt: String = message_body.chars().take(200).collect();
    let title = "New message on complaint".to_string();
    let body = format!("\"{}\": {}", complaint.title, excerpt);

    persist_and_deliver(
        state,
        recipients,
        Some(complaint_id),
        NotificationKind::NewMessage,
        title,
        body,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_significant_characters() {
        assert_eq!(
            escape_html("<script>alert('x') & \"more\"</script>"),
            "&lt;script&gt;alert(&#039;x&#039;) &amp; &quot;more&quot;&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn rejects_out_of_bound_fields() {
        assert!(validate_event("u1", Some("c1"), "title", "body").is_ok());
        assert!(validate_event("", Some("c1"), "title", "body").is_err());
        assert!(validate_event("u1", Some("c1"), &"t".repeat(501), "body").is_err());
        assert!(validate_event("u1", Some("c1"), "title", &"b".repeat(2001)).is_err());
        assert!(validate_event("u1", None, "title", "body").is_ok());
    }

    #[test]
    fn staff_authored_messages_notify_the_owner() {
        let owner = Uuid::new_v4();
        let staffer = Uuid::new_v4();
        assert_eq!(message_recipients(staffer, owner, None, &[]), vec![owner]);
    }

    #[test]
    fn owner_authored_messages_prefer_the_assignee() {
        let owner = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let pool = [Uuid::new_v4(), Uuid::new_v4()];

        assert_eq!(
            message_recipients(owner, owner, Some(assignee), &pool),
            vec![assignee]
        );
        // No assignee: the whole staff pool hears about it.
        assert_eq!(message_recipients(owner, owner, None, &pool), pool.to_vec());
    }

    #[test]
    fn author_is_never_a_recipient() {
        let owner = Uuid::new_v4();
        let other_staff = Uuid::new_v4();

        // A staff member who owns the complaint messages it: pool minus self.
        let recipients = message_recipients(owner, owner, None, &[other_staff, owner]);
        assert_eq!(recipients, vec![other_staff]);
    }
}
