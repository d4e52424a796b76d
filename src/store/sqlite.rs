//! SQLite mission store implementation

use super::{AppendOutcome, MissionStore, TransitionRecord};
use crate::drone::{Drone, DroneStatus};
use crate::mission::{AuditEntry, Mission, MissionDraft, MissionId, MissionStatus, Party};
use crate::notify::{EmailAddress, NotificationEvent, NotificationLog};
use crate::{AeromedError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed mission store
///
/// A single connection guarded by a mutex serializes access within the
/// process; the version-guarded UPDATE in `append_transition` protects
/// logical races between callers that read the same mission.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening mission store");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS missions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id TEXT NOT NULL,
                requester_name TEXT NOT NULL,
                requester_email TEXT,
                clinic_id TEXT,
                clinic_name TEXT,
                clinic_email TEXT,
                drone_id INTEGER,
                kind TEXT NOT NULL,
                priority TEXT NOT NULL,
                items TEXT NOT NULL,
                delivery_address TEXT NOT NULL,
                delivery_lat REAL,
                delivery_lon REAL,
                status TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                requested_at TEXT NOT NULL,
                accepted_at TEXT,
                launched_at TEXT,
                completed_at TEXT,
                archived_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mission_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mission_id INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                status TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                actor_role TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                note TEXT,
                UNIQUE (mission_id, seq),
                FOREIGN KEY (mission_id) REFERENCES missions(id)
            );

            CREATE TABLE IF NOT EXISTS drones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notification_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mission_id INTEGER,
                recipient TEXT NOT NULL,
                template TEXT NOT NULL,
                payload TEXT NOT NULL,
                outcome TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);
            CREATE INDEX IF NOT EXISTS idx_missions_clinic ON missions(clinic_id);
            CREATE INDEX IF NOT EXISTS idx_audit_mission ON mission_audit(mission_id);
            CREATE INDEX IF NOT EXISTS idx_events_mission ON notification_events(mission_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; propagating the data
        // anyway matches SQLite's own durability story (WAL recovers).
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

const MISSION_COLUMNS: &str = "id, requester_id, requester_name, requester_email, \
     clinic_id, clinic_name, clinic_email, drone_id, kind, priority, items, \
     delivery_address, delivery_lat, delivery_lon, status, version, \
     requested_at, accepted_at, launched_at, completed_at, archived_at, \
     created_at, updated_at";

/// Intermediate row shape; string fields are parsed into enums afterwards
struct MissionRow {
    id: i64,
    requester_id: String,
    requester_name: String,
    requester_email: Option<String>,
    clinic_id: Option<String>,
    clinic_name: Option<String>,
    clinic_email: Option<String>,
    drone_id: Option<i64>,
    kind: String,
    priority: String,
    items: String,
    delivery_address: String,
    delivery_lat: Option<f64>,
    delivery_lon: Option<f64>,
    status: String,
    version: i64,
    requested_at: String,
    accepted_at: Option<String>,
    launched_at: Option<String>,
    completed_at: Option<String>,
    archived_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_mission_row(row: &Row<'_>) -> rusqlite::Result<MissionRow> {
    Ok(MissionRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        requester_name: row.get(2)?,
        requester_email: row.get(3)?,
        clinic_id: row.get(4)?,
        clinic_name: row.get(5)?,
        clinic_email: row.get(6)?,
        drone_id: row.get(7)?,
        kind: row.get(8)?,
        priority: row.get(9)?,
        items: row.get(10)?,
        delivery_address: row.get(11)?,
        delivery_lat: row.get(12)?,
        delivery_lon: row.get(13)?,
        status: row.get(14)?,
        version: row.get(15)?,
        requested_at: row.get(16)?,
        accepted_at: row.get(17)?,
        launched_at: row.get(18)?,
        completed_at: row.get(19)?,
        archived_at: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AeromedError::Storage(format!("corrupt timestamp '{}': {}", raw, e)))
}

fn parse_opt_time(raw: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn parse_email(raw: Option<String>) -> Result<Option<EmailAddress>> {
    raw.map(EmailAddress::new).transpose().map_err(Into::into)
}

impl TryFrom<MissionRow> for Mission {
    type Error = AeromedError;

    fn try_from(row: MissionRow) -> Result<Mission> {
        let status = MissionStatus::parse(&row.status)
            .ok_or_else(|| AeromedError::Storage(format!("corrupt status '{}'", row.status)))?;
        let kind = crate::mission::MissionKind::parse(&row.kind)
            .ok_or_else(|| AeromedError::Storage(format!("corrupt kind '{}'", row.kind)))?;
        let priority = crate::mission::Priority::parse(&row.priority)
            .ok_or_else(|| AeromedError::Storage(format!("corrupt priority '{}'", row.priority)))?;

        let requester = Party {
            id: row.requester_id,
            name: row.requester_name,
            email: parse_email(row.requester_email)?,
        };
        let clinic = match (row.clinic_id, row.clinic_name) {
            (Some(id), Some(name)) => Some(Party {
                id,
                name,
                email: parse_email(row.clinic_email)?,
            }),
            _ => None,
        };

        Ok(Mission {
            id: row.id,
            requester,
            clinic,
            drone_id: row.drone_id,
            kind,
            priority,
            items: row.items,
            delivery_address: row.delivery_address,
            delivery_lat: row.delivery_lat,
            delivery_lon: row.delivery_lon,
            status,
            version: row.version as u64,
            requested_at: parse_time(&row.requested_at)?,
            accepted_at: parse_opt_time(&row.accepted_at)?,
            launched_at: parse_opt_time(&row.launched_at)?,
            completed_at: parse_opt_time(&row.completed_at)?,
            archived_at: parse_opt_time(&row.archived_at)?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

fn get_mission(conn: &Connection, id: MissionId) -> Result<Mission> {
    let sql = format!("SELECT {} FROM missions WHERE id = ?1", MISSION_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], read_mission_row)
        .optional()?
        .ok_or(AeromedError::MissionNotFound(id))?;
    row.try_into()
}

fn get_drone(conn: &Connection, id: i64) -> Result<Drone> {
    let row = conn
        .query_row(
            "SELECT id, name, status, updated_at FROM drones WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or(AeromedError::DroneNotFound(id))?;

    let status = DroneStatus::parse(&row.2)
        .ok_or_else(|| AeromedError::Storage(format!("corrupt drone status '{}'", row.2)))?;
    Ok(Drone {
        id: row.0,
        name: row.1,
        status,
        updated_at: parse_time(&row.3)?,
    })
}

impl MissionStore for SqliteStore {
    fn create(&self, draft: &MissionDraft, requested_at: DateTime<Utc>) -> Result<Mission> {
        if draft.delivery_address.trim().is_empty() {
            return Err(AeromedError::Validation("delivery address is required".into()));
        }
        if draft.items.trim().is_empty() {
            return Err(AeromedError::Validation("item descriptor is required".into()));
        }

        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let now = requested_at.to_rfc3339();

        tx.execute(
            "INSERT INTO missions (
                requester_id, requester_name, requester_email,
                kind, priority, items, delivery_address, delivery_lat, delivery_lon,
                status, version, requested_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?11, ?11)",
            params![
                draft.requester.id,
                draft.requester.name,
                draft.requester.email.as_ref().map(|e| e.to_string()),
                draft.kind.as_str(),
                draft.priority.as_str(),
                draft.items,
                draft.delivery_address,
                draft.delivery_lat,
                draft.delivery_lon,
                MissionStatus::Requested.as_str(),
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        // Creation event is audit seq 0
        tx.execute(
            "INSERT INTO mission_audit (mission_id, seq, status, actor_id, actor_role, occurred_at)
             VALUES (?1, 0, ?2, ?3, 'patient', ?4)",
            params![id, MissionStatus::Requested.as_str(), draft.requester.id, now],
        )?;

        tx.commit()?;
        tracing::debug!(mission = id, "Mission created");
        get_mission(&conn, id)
    }

    fn get(&self, id: MissionId) -> Result<Mission> {
        let conn = self.lock();
        get_mission(&conn, id)
    }

    fn append_transition(
        &self,
        id: MissionId,
        expected_version: u64,
        record: TransitionRecord<'_>,
    ) -> Result<AppendOutcome> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let now = record.occurred_at.to_rfc3339();

        // Existence first, so a missing mission is not reported as a conflict
        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM missions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if current.is_none() {
            return Err(AeromedError::MissionNotFound(id));
        }

        let changed = tx.execute(
            "UPDATE missions SET status = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![
                record.new_status.as_str(),
                now,
                id,
                expected_version as i64
            ],
        )?;
        if changed == 0 {
            // Another writer advanced the version between the caller's read
            // and this write; dropping the transaction rolls everything back.
            return Ok(AppendOutcome::Conflict);
        }

        match record.new_status {
            MissionStatus::Accepted => {
                tx.execute(
                    "UPDATE missions SET accepted_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }
            MissionStatus::InTransit => {
                tx.execute(
                    "UPDATE missions SET launched_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }
            MissionStatus::Delivered | MissionStatus::Rejected | MissionStatus::Failed => {
                tx.execute(
                    "UPDATE missions SET completed_at = ?1, archived_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }
            _ => {}
        }

        if let Some(clinic) = record.set_clinic {
            tx.execute(
                "UPDATE missions SET clinic_id = ?1, clinic_name = ?2, clinic_email = ?3
                 WHERE id = ?4",
                params![
                    clinic.id,
                    clinic.name,
                    clinic.email.as_ref().map(|e| e.to_string()),
                    id
                ],
            )?;
        }

        if let Some(drone_id) = record.assign_drone {
            let reserved = tx.execute(
                "UPDATE drones SET status = 'assigned', updated_at = ?1
                 WHERE id = ?2 AND status = 'available'",
                params![now, drone_id],
            )?;
            if reserved == 0 {
                // Distinguish a missing drone from a busy one; either way the
                // transaction is dropped and the transition does not happen.
                let drone = get_drone(&tx, drone_id)?;
                return Err(AeromedError::DroneUnavailable {
                    id: drone_id,
                    status: drone.status.as_str().to_string(),
                });
            }
            tx.execute(
                "UPDATE missions SET drone_id = ?1 WHERE id = ?2",
                params![drone_id, id],
            )?;
        }

        if record.release_drone {
            tx.execute(
                "UPDATE drones SET status = 'available', updated_at = ?1
                 WHERE id = (SELECT drone_id FROM missions WHERE id = ?2)",
                params![now, id],
            )?;
        }

        tx.execute(
            "INSERT INTO mission_audit (mission_id, seq, status, actor_id, actor_role, occurred_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                (expected_version + 1) as i64,
                record.new_status.as_str(),
                record.actor.id(),
                record.actor.role.as_str(),
                now,
                record.note,
            ],
        )?;

        tx.commit()?;
        tracing::debug!(
            mission = id,
            status = %record.new_status,
            version = expected_version + 1,
            "Transition committed"
        );
        get_mission(&conn, id).map(AppendOutcome::Committed)
    }

    fn audit_log(&self, id: MissionId) -> Result<Vec<AuditEntry>> {
        let conn = self.lock();
        // Verify existence so an empty trail is not returned for unknown ids
        get_mission(&conn, id)?;

        let mut stmt = conn.prepare(
            "SELECT seq, status, actor_id, actor_role, occurred_at, note
             FROM mission_audit WHERE mission_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, status, actor_id, actor_role, occurred_at, note) = row?;
            entries.push(AuditEntry {
                mission_id: id,
                seq: seq as u64,
                status: MissionStatus::parse(&status).ok_or_else(|| {
                    AeromedError::Storage(format!("corrupt audit status '{}'", status))
                })?,
                actor_id,
                actor_role: actor_role
                    .parse()
                    .map_err(|_| AeromedError::Storage(format!("corrupt role '{}'", actor_role)))?,
                occurred_at: parse_time(&occurred_at)?,
                note,
            });
        }
        Ok(entries)
    }

    fn list_missions(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>> {
        let conn = self.lock();
        let (sql, filter) = match status {
            Some(s) => (
                format!(
                    "SELECT {} FROM missions WHERE status = ?1 ORDER BY id",
                    MISSION_COLUMNS
                ),
                Some(s.as_str()),
            ),
            None => (
                format!("SELECT {} FROM missions ORDER BY id", MISSION_COLUMNS),
                None,
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<MissionRow> = match filter {
            Some(s) => stmt
                .query_map(params![s], read_mission_row)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map([], read_mission_row)?
                .collect::<rusqlite::Result<_>>()?,
        };

        rows.into_iter().map(Mission::try_from).collect()
    }

    fn active_clinic_missions(&self, clinic_id: &str) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM missions
             WHERE clinic_id = ?1 AND status IN ('accepted', 'assigned', 'in_transit')",
            params![clinic_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn add_drone(&self, name: &str) -> Result<Drone> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO drones (name, status, updated_at) VALUES (?1, 'available', ?2)",
            params![name, now],
        )?;
        get_drone(&conn, conn.last_insert_rowid())
    }

    fn get_drone(&self, id: i64) -> Result<Drone> {
        let conn = self.lock();
        get_drone(&conn, id)
    }

    fn list_drones(&self) -> Result<Vec<Drone>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, name, status, updated_at FROM drones ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut drones = Vec::new();
        for row in rows {
            let (id, name, status, updated_at) = row?;
            drones.push(Drone {
                id,
                name,
                status: DroneStatus::parse(&status).ok_or_else(|| {
                    AeromedError::Storage(format!("corrupt drone status '{}'", status))
                })?,
                updated_at: parse_time(&updated_at)?,
            });
        }
        Ok(drones)
    }

    fn set_drone_status(&self, id: i64, status: DroneStatus) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE drones SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(AeromedError::DroneNotFound(id));
        }
        Ok(())
    }
}

impl NotificationLog for SqliteStore {
    fn record(&self, event: &NotificationEvent) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO notification_events
                 (mission_id, recipient, template, payload, outcome, attempts, last_error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.mission_id,
                event.recipient,
                event.kind.as_str(),
                event.payload,
                event.outcome.as_str(),
                event.attempts,
                event.last_error,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
