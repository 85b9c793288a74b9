use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use lifeline_types::api::{NewHelpRequest, RequestQuery, VolunteerProfileUpdate};
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{
    HelpRequest, Notification, Profile, RescueUpdate, Role, VolunteerProfile,
};

use crate::Database;
use crate::models::{NewAccountRow, TransitionResult, UserRow};

const HELP_REQUEST_COLUMNS: &str = "id, victim_id, victim_name, phone, emergency_type, description, \
     latitude, longitude, location_address, photo_url, status, assigned_volunteer_id, admin_notes, \
     created_at, updated_at";

impl Database {
    // -- Accounts --

    /// Provision credentials, profile and (for volunteers) a volunteer profile.
    /// Returns `None` if the email is already registered.
    pub fn create_account(&self, user_id: Uuid, account: &NewAccountRow<'_>) -> Result<Option<Profile>> {
        self.with_tx(|tx| {
            let taken: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [account.email], |row| row.get(0))
                .optional()?;
            if taken.is_some() {
                return Ok(None);
            }

            let id = user_id.to_string();
            let now = timestamp();
            tx.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, account.email, account.password_hash, now],
            )?;
            tx.execute(
                "INSERT INTO profiles (user_id, email, full_name, role, phone, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![id, account.email, account.full_name, account.role.as_str(), account.phone, now],
            )?;
            if account.role == Role::Volunteer {
                tx.execute(
                    "INSERT INTO volunteer_profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![id, now],
                )?;
            }

            query_profile(tx, user_id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    // -- Volunteer profiles --

    pub fn get_volunteer_profile(&self, user_id: Uuid) -> Result<Option<VolunteerProfile>> {
        self.with_conn(|conn| query_volunteer_profile(conn, user_id))
    }

    /// Partial update; `None` fields keep their stored value.
    pub fn update_volunteer_profile(
        &self,
        user_id: Uuid,
        update: &VolunteerProfileUpdate,
    ) -> Result<Option<VolunteerProfile>> {
        let skills = update.skills.as_ref().map(serde_json::to_string).transpose()?;

        self.with_tx(|tx| {
            tx.execute(
                "UPDATE volunteer_profiles SET
                    is_active = COALESCE(?1, is_active),
                    availability = COALESCE(?2, availability),
                    skills = COALESCE(?3, skills),
                    latitude = COALESCE(?4, latitude),
                    longitude = COALESCE(?5, longitude),
                    location_address = COALESCE(?6, location_address),
                    updated_at = ?7
                 WHERE user_id = ?8",
                params![
                    update.is_active,
                    update.availability,
                    skills,
                    update.latitude,
                    update.longitude,
                    update.location_address,
                    timestamp(),
                    user_id.to_string(),
                ],
            )?;
            query_volunteer_profile(tx, user_id)
        })
    }

    // -- Help requests --

    pub fn insert_help_request(&self, id: Uuid, new: &NewHelpRequest) -> Result<HelpRequest> {
        self.with_tx(|tx| {
            let now = timestamp();
            tx.execute(
                "INSERT INTO help_requests (id, victim_id, victim_name, phone, emergency_type, description,
                    latitude, longitude, location_address, photo_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    id.to_string(),
                    new.victim_id.to_string(),
                    new.victim_name,
                    new.phone,
                    new.emergency_type.as_str(),
                    new.description,
                    new.latitude,
                    new.longitude,
                    new.location_address,
                    new.photo_url,
                    now,
                ],
            )?;
            query_help_request(tx, id)?.ok_or_else(|| anyhow!("help request {} missing after insert", id))
        })
    }

    pub fn get_help_request(&self, id: Uuid) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| query_help_request(conn, id))
    }

    pub fn query_help_requests(&self, query: &RequestQuery) -> Result<Vec<HelpRequest>> {
        self.with_conn(|conn| {
            let mut clauses = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(victim_id) = query.victim_id {
                values.push(victim_id.to_string());
                clauses.push(format!("victim_id = ?{}", values.len()));
            }
            if let Some(volunteer_id) = query.assigned_volunteer_id {
                values.push(volunteer_id.to_string());
                clauses.push(format!("assigned_volunteer_id = ?{}", values.len()));
            }
            if let Some(status) = query.status {
                values.push(status.as_str().to_string());
                clauses.push(format!("status = ?{}", values.len()));
            }

            let mut sql = format!("SELECT {} FROM help_requests", HELP_REQUEST_COLUMNS);
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            // rowid breaks ties between rows created in the same microsecond
            sql.push_str(" ORDER BY created_at DESC, rowid DESC");
            if let Some(limit) = query.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), help_request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Compare-and-set on status. The update, the rescue-update log entry and
    /// the rescue counter move together or not at all.
    pub fn apply_transition(&self, id: Uuid, transition: &Transition) -> Result<TransitionResult> {
        // Status names are static enum strings, never caller input.
        let allowed = transition
            .allowed_from()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        self.with_tx(|tx| {
            let now = timestamp();
            let changed = tx.execute(
                &format!(
                    "UPDATE help_requests
                     SET status = ?1,
                         assigned_volunteer_id = COALESCE(?2, assigned_volunteer_id),
                         updated_at = ?3
                     WHERE id = ?4 AND status IN ({})",
                    allowed
                ),
                params![
                    transition.target().as_str(),
                    transition.assigns().map(|v| v.to_string()),
                    now,
                    id.to_string(),
                ],
            )?;

            if changed == 0 {
                return Ok(match query_help_request(tx, id)? {
                    Some(current) => TransitionResult::Rejected { current: current.status },
                    None => TransitionResult::NotFound,
                });
            }

            let request = query_help_request(tx, id)?
                .ok_or_else(|| anyhow!("help request {} missing after update", id))?;

            tx.execute(
                "INSERT INTO rescue_updates (id, request_id, status, volunteer_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    id.to_string(),
                    request.status.as_str(),
                    request.assigned_volunteer_id.map(|v| v.to_string()),
                    now,
                ],
            )?;

            if let (Transition::Complete, Some(volunteer_id)) = (transition, request.assigned_volunteer_id) {
                tx.execute(
                    "UPDATE volunteer_profiles SET total_rescues = total_rescues + 1, updated_at = ?1
                     WHERE user_id = ?2",
                    params![now, volunteer_id.to_string()],
                )?;
            }

            Ok(TransitionResult::Applied(request))
        })
    }

    // -- Rescue updates --

    /// Oldest first: the log reads as a timeline.
    pub fn list_rescue_updates(&self, request_id: Uuid) -> Result<Vec<RescueUpdate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, request_id, status, latitude, longitude, notes, volunteer_id, created_at
                 FROM rescue_updates
                 WHERE request_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([request_id.to_string()], |row| {
                    Ok(RescueUpdate {
                        id: col(row, 0)?,
                        request_id: col(row, 1)?,
                        status: col(row, 2)?,
                        latitude: row.get(3)?,
                        longitude: row.get(4)?,
                        notes: row.get(5)?,
                        volunteer_id: opt_col(row, 6)?,
                        created_at: col(row, 7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: Option<&str>,
    ) -> Result<Notification> {
        let id = Uuid::new_v4();
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO notifications (id, user_id, title, message, type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id.to_string(), user_id.to_string(), title, message, kind, timestamp()],
            )?;
            query_notification(tx, id)?.ok_or_else(|| anyhow!("notification {} missing after insert", id))
        })
    }

    pub fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, message, type, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Only the owner can mark a notification read; returns `None` otherwise.
    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_notification(tx, id)
        })
    }
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_profile(conn: &Connection, user_id: Uuid) -> Result<Option<Profile>> {
    conn.query_row(
        "SELECT user_id, email, full_name, role, phone, avatar_url, created_at, updated_at
         FROM profiles WHERE user_id = ?1",
        [user_id.to_string()],
        |row| {
            Ok(Profile {
                user_id: col(row, 0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                role: col(row, 3)?,
                phone: row.get(4)?,
                avatar_url: row.get(5)?,
                created_at: col(row, 6)?,
                updated_at: col(row, 7)?,
            })
        },
    )
    .optional()
}

fn query_volunteer_profile(conn: &Connection, user_id: Uuid) -> Result<Option<VolunteerProfile>> {
    conn.query_row(
        "SELECT user_id, latitude, longitude, location_address, availability, is_active, skills,
                total_rescues, created_at, updated_at
         FROM volunteer_profiles WHERE user_id = ?1",
        [user_id.to_string()],
        |row| {
            let skills: String = row.get(6)?;
            Ok(VolunteerProfile {
                user_id: col(row, 0)?,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                location_address: row.get(3)?,
                availability: row.get(4)?,
                is_active: row.get(5)?,
                skills: serde_json::from_str(&skills).map_err(|e| conversion_error(6, e))?,
                total_rescues: row.get(7)?,
                created_at: col(row, 8)?,
                updated_at: col(row, 9)?,
            })
        },
    )
    .optional()
}

fn query_help_request(conn: &Connection, id: Uuid) -> Result<Option<HelpRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM help_requests WHERE id = ?1", HELP_REQUEST_COLUMNS),
        [id.to_string()],
        help_request_from_row,
    )
    .optional()
}

fn query_notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
    conn.query_row(
        "SELECT id, user_id, title, message, type, is_read, created_at FROM notifications WHERE id = ?1",
        [id.to_string()],
        notification_from_row,
    )
    .optional()
}

fn help_request_from_row(row: &Row<'_>) -> rusqlite::Result<HelpRequest> {
    Ok(HelpRequest {
        id: col(row, 0)?,
        victim_id: col(row, 1)?,
        victim_name: row.get(2)?,
        phone: row.get(3)?,
        emergency_type: col(row, 4)?,
        description: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        location_address: row.get(8)?,
        photo_url: row.get(9)?,
        status: col(row, 10)?,
        assigned_volunteer_id: opt_col(row, 11)?,
        admin_notes: row.get(12)?,
        created_at: col(row, 13)?,
        updated_at: col(row, 14)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: col(row, 0)?,
        user_id: col(row, 1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        is_read: row.get(5)?,
        created_at: col::<DateTime<Utc>>(row, 6)?,
    })
}

/// Read a TEXT column and parse it (uuids, timestamps, enum names).
fn col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse::<T>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
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
