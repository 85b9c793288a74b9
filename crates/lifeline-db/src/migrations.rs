use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id     TEXT PRIMARY KEY REFERENCES users(id),
                email       TEXT NOT NULL,
                full_name   TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('victim', 'volunteer', 'admin')),
                phone       TEXT,
                avatar_url  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE volunteer_profiles (
                user_id          TEXT PRIMARY KEY REFERENCES users(id),
                latitude         REAL,
                longitude        REAL,
                location_address TEXT,
                availability     TEXT,
                is_active        INTEGER NOT NULL DEFAULT 1,
                skills           TEXT NOT NULL DEFAULT '[]',
                total_rescues    INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE TABLE help_requests (
                id                    TEXT PRIMARY KEY,
                victim_id             TEXT NOT NULL REFERENCES users(id),
                victim_name           TEXT NOT NULL,
                phone                 TEXT NOT NULL,
                emergency_type        TEXT NOT NULL CHECK (emergency_type IN
                    ('flood', 'fire', 'earthquake', 'medical', 'trapped', 'other')),
                description           TEXT,
                latitude              REAL NOT NULL,
                longitude             REAL NOT NULL,
                location_address      TEXT,
                photo_url             TEXT,
                status                TEXT NOT NULL DEFAULT 'pending' CHECK (status IN
                    ('pending', 'in_progress', 'rescued', 'cancelled')),
                assigned_volunteer_id TEXT REFERENCES users(id),
                admin_notes           TEXT,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL
            );

            CREATE INDEX idx_help_requests_victim
                ON help_requests(victim_id, created_at);

            CREATE INDEX idx_help_requests_status
                ON help_requests(status, created_at);

            CREATE TABLE rescue_updates (
                id            TEXT PRIMARY KEY,
                request_id    TEXT NOT NULL REFERENCES help_requests(id),
                status        TEXT NOT NULL,
                latitude      REAL,
                longitude     REAL,
                notes         TEXT,
                volunteer_id  TEXT REFERENCES users(id),
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_rescue_updates_request
                ON rescue_updates(request_id, created_at);

            CREATE TRIGGER rescue_updates_no_update BEFORE UPDATE ON rescue_updates
            BEGIN
                SELECT RAISE(ABORT, 'rescue_updates is append-only');
            END;

            CREATE TRIGGER rescue_updates_no_delete BEFORE DELETE ON rescue_updates
            BEGIN
                SELECT RAISE(ABORT, 'rescue_updates is append-only');
            END;

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                message     TEXT NOT NULL,
                type        TEXT,
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
