use crate::db;
use crate::model::{Attendance, AttendanceStatus, DayRecord, Student};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

pub const STUDENTS_KEY: &str = "student_app_data_v1";
pub const ATTENDANCE_KEY: &str = "student_app_attendance_v1";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value blob store behind the roster controller.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes every entry or none of them.
    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| {
                r.get::<_, String>(0)
            })
            .optional()?)
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_store(key, value, updated_at)
                 VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                (key, value, &now),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

pub fn encode_students(students: &[Student]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(students)?)
}

pub fn encode_attendance(attendance: &Attendance) -> Result<String, StoreError> {
    Ok(serde_json::to_string(attendance)?)
}

pub fn decode_students(text: &str) -> Result<Vec<Student>, StoreError> {
    Ok(serde_json::from_str(text)?)
}

/// Parses a stored attendance blob. Entries whose status is outside the known
/// set are dropped with a warning instead of failing the whole store.
pub fn decode_attendance(text: &str) -> Result<Attendance, StoreError> {
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    let mut attendance = Attendance::default();
    for (date, day) in raw {
        let Some(entries) = day.as_object() else {
            warn!(%date, "skipping attendance day that is not an object");
            continue;
        };
        let mut record = DayRecord::new();
        for (student_id, status) in entries {
            match status.as_str().map(str::parse::<AttendanceStatus>) {
                Some(Ok(st)) => {
                    record.insert(student_id.clone(), st);
                }
                _ => warn!(%date, %student_id, %status, "skipping unknown attendance status"),
            }
        }
        if !record.is_empty() {
            attendance.days.insert(date, record);
        }
    }
    Ok(attendance)
}

/// Reads the roster. Missing, unreadable or malformed data is "no data yet".
pub fn load_students<S: KeyValueStore + ?Sized>(store: &S) -> Vec<Student> {
    match store.get(STUDENTS_KEY).and_then(|v| match v {
        Some(text) => decode_students(&text),
        None => Ok(Vec::new()),
    }) {
        Ok(students) => students,
        Err(e) => {
            warn!(error = %e, key = STUDENTS_KEY, "failed to load roster; starting empty");
            Vec::new()
        }
    }
}

pub fn load_attendance<S: KeyValueStore + ?Sized>(store: &S) -> Attendance {
    match store.get(ATTENDANCE_KEY).and_then(|v| match v {
        Some(text) => decode_attendance(&text),
        None => Ok(Attendance::default()),
    }) {
        Ok(attendance) => attendance,
        Err(e) => {
            warn!(error = %e, key = ATTENDANCE_KEY, "failed to load attendance; starting empty");
            Attendance::default()
        }
    }
}

#[cfg(test)]
pub use memory::MemoryStore;
