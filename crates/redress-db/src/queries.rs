use crate::Database;
use crate::models::{ComplaintRow, HistoryRow, MessageRow, NotificationRow, RoleRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        full_name: &str,
        student_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, full_name, student_id, phone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, email, password_hash, full_name, student_id, phone],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password, full_name, student_id, phone, created_at
                 FROM users ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Roles --

    pub fn roles_of(&self, user_id: &str) -> Result<Vec<RoleRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, role, department FROM user_roles WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], role_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_roles(&self) -> Result<Vec<RoleRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id, role, department FROM user_roles")?;
            let rows = stmt
                .query_map([], role_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Grant a role. Idempotent on (user, role); re-granting refreshes the
    /// department scope. Users hold a set of roles, not a single slot.
    pub fn set_role(
        &self,
        id: &str,
        user_id: &str,
        role: &str,
        department: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_roles (id, user_id, role, department)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, role) DO UPDATE SET department = excluded.department",
                rusqlite::params![id, user_id, role, department],
            )?;
            Ok(())
        })
    }

    // -- Complaints --

    /// Insert the complaint and its initial `Submitted` history entry in one
    /// transaction. Status and history never diverge.
    #[allow(clippy::too_many_arguments)]
    pub fn create_complaint(
        &self,
        id: &str,
        history_id: &str,
        user_id: &str,
        title: &str,
        description: &str,
        category: &str,
        priority: &str,
        is_anonymous: bool,
        location: Option<&str>,
        incident_date: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO complaints
                     (id, user_id, title, description, category, priority, status,
                      is_anonymous, location, incident_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'Submitted', ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    user_id,
                    title,
                    description,
                    category,
                    priority,
                    is_anonymous,
                    location,
                    incident_date
                ],
            )?;
            tx.execute(
                "INSERT INTO complaint_status_history (id, complaint_id, status, changed_by)
                 VALUES (?1, ?2, 'Submitted', NULL)",
                rusqlite::params![history_id, id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_complaint(&self, id: &str) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{COMPLAINT_SELECT} WHERE id = ?1"))?;
            let row = stmt.query_row([id], complaint_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_complaints_all(&self) -> Result<Vec<ComplaintRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{COMPLAINT_SELECT} ORDER BY created_at DESC"))?;
            let rows = stmt
                .query_map([], complaint_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_complaints_for_user(&self, user_id: &str) -> Result<Vec<ComplaintRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{COMPLAINT_SELECT} WHERE user_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], complaint_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a validated status transition with a stale-state guard.
    ///
    /// The UPDATE carries `status = expected` as a precondition: if another
    /// transition committed since the caller read the row, zero rows change
    /// and `Ok(false)` is returned with nothing written. On success the
    /// history entry is appended in the same transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn transition_complaint(
        &self,
        id: &str,
        history_id: &str,
        expected_status: &str,
        new_status: &str,
        changed_by: &str,
        note: Option<&str>,
        stamp_escalated: bool,
        stamp_resolved: bool,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE complaints SET
                     status = ?2,
                     updated_at = datetime('now'),
                     escalated_at = CASE WHEN ?3 THEN datetime('now') ELSE escalated_at END,
                     resolved_at  = CASE WHEN ?4 THEN datetime('now') ELSE resolved_at END
                 WHERE id = ?1 AND status = ?5",
                rusqlite::params![id, new_status, stamp_escalated, stamp_resolved, expected_status],
            )?;
            if changed == 0 {
                // Stale precondition; leave no trace.
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO complaint_status_history (id, complaint_id, status, changed_by, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![history_id, id, new_status, changed_by, note],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn assign_complaint(&self, id: &str, assignee: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE complaints SET assigned_to = ?2, updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![id, assignee],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_history(&self, complaint_id: &str) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, changed_by, notes, created_at
                 FROM complaint_status_history
                 WHERE complaint_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([complaint_id], |row| {
                    Ok(HistoryRow {
                        status: row.get(0)?,
                        changed_by: row.get(1)?,
                        notes: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        complaint_id: &str,
        user_id: &str,
        is_staff: bool,
        body: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO complaint_messages (id, complaint_id, user_id, is_staff, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, complaint_id, user_id, is_staff, body],
            )?;
            Ok(())
        })
    }

    /// Commit order: creation time ascending, insertion order on ties.
    pub fn list_messages(&self, complaint_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // JOIN users to fetch author_name in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.complaint_id, m.user_id, u.full_name, m.is_staff, m.body, m.created_at
                 FROM complaint_messages m
                 LEFT JOIN users u ON m.user_id = u.id
                 WHERE m.complaint_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([complaint_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        complaint_id: row.get(1)?,
                        user_id: row.get(2)?,
                        author_name: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        is_staff: row.get(4)?,
                        body: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        complaint_id: Option<&str>,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, complaint_id, kind, title, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, user_id, complaint_id, kind, title, body],
            )?;
            Ok(())
        })
    }

    pub fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, complaint_id, kind, title, body, is_read, created_at
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        complaint_id: row.get(2)?,
                        kind: row.get(3)?,
                        title: row.get(4)?,
                        body: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Read-flag mutation is recipient-gated at the SQL level.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            Ok(changed > 0)
        })
    }
}

const COMPLAINT_SELECT: &str = "SELECT id, user_id, title, description, category, priority, status,
        is_anonymous, assigned_to, location, incident_date,
        created_at, updated_at, escalated_at, resolved_at
 FROM complaints";

fn complaint_from_row(row: &rusqlite::Row) -> std::result::Result<ComplaintRow, rusqlite::Error> {
    Ok(ComplaintRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        is_anonymous: row.get(7)?,
        assigned_to: row.get(8)?,
        location: row.get(9)?,
        incident_date: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        escalated_at: row.get(13)?,
        resolved_at: row.get(14)?,
    })
}

fn user_from_row(row: &rusqlite::Row) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        full_name: row.get(3)?,
        student_id: row.get(4)?,
        phone: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn role_from_row(row: &rusqlite::Row) -> std::result::Result<RoleRow, rusqlite::Error> {
    Ok(RoleRow {
        user_id: row.get(0)?,
        role: row.get(1)?,
        department: row.get(2)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, password, full_name, student_id, phone, created_at
         FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt.query_row([value], user_from_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
