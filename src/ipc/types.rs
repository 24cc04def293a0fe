use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::calendar::CalendarNav;
use crate::controller::RosterController;
use crate::messages::DraftDispatcher;
use crate::migrate::MigrationReport;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response channel shared between the request loop and draft workers.
pub type SharedOut = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes one response line. A poisoned lock still writes; the stream itself
/// is line-oriented and has no state to corrupt.
pub fn write_line(out: &SharedOut, value: &serde_json::Value) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let mut w = out.lock().unwrap_or_else(|p| p.into_inner());
    let _ = writeln!(w, "{}", line);
    let _ = w.flush();
}

pub enum Reply {
    Now(serde_json::Value),
    /// A worker writes the response later under the same request id.
    Deferred,
}

pub struct Workspace {
    pub path: PathBuf,
    pub roster: RosterController<SqliteStore>,
}

pub struct AppState {
    pub workspace: Option<Workspace>,
    pub calendar: CalendarNav,
    pub drafts: DraftDispatcher,
    pub out: SharedOut,
}

impl AppState {
    pub fn new(drafts: DraftDispatcher, out: SharedOut) -> Self {
        Self {
            workspace: None,
            calendar: CalendarNav::starting_today(),
            drafts,
            out,
        }
    }

    /// Opens (or creates) the workspace store and loads it, replacing any
    /// workspace that was open before.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<MigrationReport> {
        let store = SqliteStore::open(path)?;
        let (roster, report) = RosterController::load(store);
        tracing::info!(
            workspace = %path.display(),
            students = roster.students().len(),
            days = roster.attendance().days.len(),
            "workspace opened"
        );
        self.workspace = Some(Workspace {
            path: path.to_path_buf(),
            roster,
        });
        Ok(report)
    }
}
