use crate::attendance::date_key;
use crate::ipc::helpers::{
    date_or_selected, get_optional_str, get_required_str, reply, roster, roster_mut, visible_ids,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceStatus, DayStats};
use serde_json::json;

fn stats_json(stats: &DayStats) -> serde_json::Value {
    json!({
        "present": stats.present,
        "absent": stats.absent,
        "late": stats.late,
        "excused": stats.excused,
        "none": stats.none,
        "total": stats.total(),
    })
}

/// Explicit `studentIds` win over the `school` filter.
fn target_ids(state: &AppState, params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    if let Some(raw) = params.get("studentIds").filter(|v| !v.is_null()) {
        let Some(items) = raw.as_array() else {
            return Err(HandlerErr::bad_params("studentIds must be an array"));
        };
        return items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| HandlerErr::bad_params("studentIds must contain strings"))
            })
            .collect();
    }
    let school = get_optional_str(params, "school")?;
    Ok(visible_ids(roster(state)?, school.as_deref()))
}

fn attendance_day(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = date_or_selected(state, params)?;
    let school = get_optional_str(params, "school")?;
    let roster = roster(state)?;
    let students = roster.students_in_school(school.as_deref());

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "fullName": s.full_name,
                "status": roster.attendance().status(date, &s.id),
            })
        })
        .collect();
    let ids = visible_ids(roster, school.as_deref());
    Ok(json!({
        "date": date_key(date),
        "school": school,
        "rows": rows,
        "stats": stats_json(&roster.day_stats(date, &ids)),
    }))
}

fn attendance_set_status(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = date_or_selected(state, params)?;
    let student_id = get_required_str(params, "studentId")?;
    let status: AttendanceStatus = get_required_str(params, "status")?
        .parse()
        .map_err(|e: crate::model::UnknownStatus| {
            HandlerErr::bad_params(e.to_string())
                .with_details(json!({ "allowed": AttendanceStatus::ALL }))
        })?;

    let change = roster_mut(state)?.set_attendance_status(date, &student_id, status)?;
    Ok(json!({
        "date": date_key(date),
        "studentId": student_id,
        "status": change.status,
        "persisted": change.persisted,
    }))
}

fn attendance_mark_all_present(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = date_or_selected(state, params)?;
    let ids = target_ids(state, params)?;
    let roster = roster_mut(state)?;
    let change = roster.mark_all_present(date, &ids);
    Ok(json!({
        "date": date_key(date),
        "marked": change.marked,
        "persisted": change.persisted,
        "stats": stats_json(&roster.day_stats(date, &ids)),
    }))
}

fn attendance_stats(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = date_or_selected(state, params)?;
    let ids = target_ids(state, params)?;
    let mut out = stats_json(&roster(state)?.day_stats(date, &ids));
    out["date"] = json!(date_key(date));
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.day" => attendance_day(state, &req.params),
        "attendance.setStatus" => attendance_set_status(state, &req.params),
        "attendance.markAllPresent" => attendance_mark_all_present(state, &req.params),
        "attendance.stats" => attendance_stats(state, &req.params),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
