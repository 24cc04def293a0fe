use crate::attendance::parse_date_key;
use crate::controller::{ControllerError, RosterController};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Workspace};
use crate::store::SqliteStore;
use chrono::NaiveDate;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ControllerError> for HandlerErr {
    fn from(e: ControllerError) -> Self {
        let message = e.to_string();
        match e {
            ControllerError::UnknownStudent(id) => HandlerErr::new("not_found", message)
                .with_details(serde_json::json!({ "studentId": id })),
        }
    }
}

pub fn reply(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(id, value),
        Err(error) => error.response(id),
    }
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; absent, `null` and blank all read as `None`.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_bool(params: &serde_json::Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// `params.date` as `YYYY-MM-DD`, or the calendar's selected day.
pub fn date_or_selected(state: &AppState, params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match get_optional_str(params, "date")? {
        Some(raw) => parse_date_key(&raw)
            .map_err(|_| HandlerErr::bad_params(format!("date must be YYYY-MM-DD, got {}", raw))),
        None => Ok(state.calendar.selected_date()),
    }
}

pub fn workspace(state: &AppState) -> Result<&Workspace, HandlerErr> {
    state
        .workspace
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn roster(state: &AppState) -> Result<&RosterController<SqliteStore>, HandlerErr> {
    workspace(state).map(|w| &w.roster)
}

pub fn roster_mut(state: &mut AppState) -> Result<&mut RosterController<SqliteStore>, HandlerErr> {
    state
        .workspace
        .as_mut()
        .map(|w| &mut w.roster)
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Ids of the students shown for an optional school filter, in roster order.
pub fn visible_ids(roster: &RosterController<SqliteStore>, school: Option<&str>) -> Vec<String> {
    roster
        .students_in_school(school)
        .into_iter()
        .map(|s| s.id.clone())
        .collect()
}
