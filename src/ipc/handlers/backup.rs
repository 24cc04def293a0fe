use crate::backup;
use crate::ipc::helpers::{get_required_str, reply, roster, roster_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn backup_export_workspace(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let roster = roster(state)?;
    let export = backup::export_bundle(
        roster.students(),
        roster.attendance(),
        &PathBuf::from(&out_path),
    )
    .map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;

    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "students": export.students,
        "attendanceDays": export.days,
    }))
}

/// Replaces the open workspace's data with the bundle's. Nothing changes when
/// the bundle cannot be read or fails its checksums.
fn backup_import_workspace(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let roster = roster_mut(state)?;
    let contents = backup::read_bundle(&PathBuf::from(&in_path)).map_err(|e| {
        HandlerErr::new("import_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    let format = contents.format_detected;
    let replaced = roster.replace_all(contents.students, contents.attendance);

    Ok(json!({
        "path": in_path,
        "bundleFormatDetected": format,
        "students": roster.students().len(),
        "attendanceDays": roster.attendance().days.len(),
        "orphansDropped": replaced.orphans_dropped,
        "migration": {
            "idsAssigned": replaced.migration.ids_assigned,
            "schoolsBackfilled": replaced.migration.schools_backfilled,
            "parentsBackfilled": replaced.migration.parents_backfilled,
        },
        "persisted": replaced.persisted,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspace" => backup_export_workspace(state, &req.params),
        "backup.importWorkspace" => backup_import_workspace(state, &req.params),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
