use crate::ipc::helpers::{get_required_str, reply, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn health(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|w| w.path.to_string_lossy().to_string()),
        "generatorConfigured": state.drafts.is_configured(),
        "pendingDrafts": state.drafts.pending(),
    }))
}

fn workspace_select(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    let report = state
        .open_workspace(&path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    let roster = &state
        .workspace
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "workspace did not open"))?
        .roster;

    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "students": roster.students().len(),
        "attendanceDays": roster.attendance().days.len(),
        "migration": {
            "idsAssigned": report.ids_assigned,
            "schoolsBackfilled": report.schools_backfilled,
            "parentsBackfilled": report.parents_backfilled,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(reply(&req.id, health(state))),
        "workspace.select" => Some(reply(&req.id, workspace_select(state, &req.params))),
        _ => None,
    }
}
