use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            full_name   TEXT NOT NULL,
            student_id  TEXT,
            phone       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            role        TEXT NOT NULL,
            department  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, role)
        );

        CREATE INDEX IF NOT EXISTS idx_user_roles_user
            ON user_roles(user_id);

        CREATE TABLE IF NOT EXISTS complaints (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id),
            title         TEXT NOT NULL,
            description   TEXT NOT NULL,
            category      TEXT NOT NULL,
            priority      TEXT NOT NULL DEFAULT 'Medium',
            status        TEXT NOT NULL DEFAULT 'Submitted',
            is_anonymous  INTEGER NOT NULL DEFAULT 0,
            assigned_to   TEXT REFERENCES users(id),
            location      TEXT,
            incident_date TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
            escalated_at  TEXT,
            resolved_at   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_complaints_user
            ON complaints(user_id, created_at);

        -- Append-only: rows here are never updated or deleted.
        CREATE TABLE IF NOT EXISTS complaint_status_history (
            id           TEXT PRIMARY KEY,
            complaint_id TEXT NOT NULL REFERENCES complaints(id),
            status       TEXT NOT NULL,
            changed_by   TEXT REFERENCES users(id),
            notes        TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_history_complaint
            ON complaint_status_history(complaint_id, created_at);

        -- Append-only; ordering key is (created_at, rowid).
        CREATE TABLE IF NOT EXISTS complaint_messages (
            id           TEXT PRIMARY KEY,
            complaint_id TEXT NOT NULL REFERENCES complaints(id),
            user_id      TEXT NOT NULL REFERENCES users(id),
            is_staff     INTEGER NOT NULL DEFAULT 0,
            body         TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_complaint
            ON complaint_messages(complaint_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL REFERENCES users(id),
            complaint_id TEXT REFERENCES complaints(id),
            kind         TEXT NOT NULL,
            title        TEXT NOT NULL,
            body         TEXT NOT NULL,
            is_read      INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
