use crate::controller::DeleteOutcome;
use crate::ipc::helpers::{
    get_bool, get_optional_str, get_required_str, reply, roster, roster_mut, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::migrate;
use crate::model::{present, Student};
use serde_json::json;

const DELETE_CONFIRMATION: &str =
    "Êtes-vous sûr de vouloir supprimer cet élève et toutes ses données ?";

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school = get_optional_str(params, "school")?;
    let roster = roster(state)?;
    let students = roster.students_in_school(school.as_deref());
    Ok(json!({
        "school": school,
        "count": students.len(),
        "students": to_json(&students)?,
    }))
}

fn students_schools(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let roster = roster(state)?;
    Ok(json!({
        "total": roster.students().len(),
        "schools": to_json(&roster.school_groups())?,
    }))
}

fn students_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = roster(state)?.student(&student_id).ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })?;
    Ok(json!({ "student": to_json(student)? }))
}

/// Form boundary: the record must carry a name and a Turkish-course school.
/// An empty id means a new student.
fn parse_form(params: &serde_json::Value) -> Result<Student, HandlerErr> {
    let raw = params
        .get("student")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing student"))?;
    let mut student: Student = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid student: {}", e)))?;

    migrate::upgrade_fields(&mut student);
    student.full_name = student.full_name.trim().to_string();
    if student.full_name.is_empty() {
        return Err(HandlerErr::bad_params("fullName is required")
            .with_details(json!({ "field": "fullName" })));
    }
    if present(&student.turkish_school).map(str::trim).unwrap_or("").is_empty() {
        return Err(HandlerErr::bad_params("turkishSchool is required")
            .with_details(json!({ "field": "turkishSchool" })));
    }
    student.id = student.id.trim().to_string();
    if student.id.is_empty() {
        student.id = migrate::new_student_id();
    }
    Ok(student)
}

fn students_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student = parse_form(params)?;
    let roster = roster_mut(state)?;
    let id = student.id.clone();
    let saved = roster.add_or_update_student(student);
    let stored = roster
        .student(&id)
        .ok_or_else(|| HandlerErr::new("internal", "saved student vanished"))?;
    Ok(json!({
        "student": to_json(stored)?,
        "created": saved.created,
        "persisted": saved.persisted,
    }))
}

fn students_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let confirmed = get_bool(params, "confirmed");
    match roster_mut(state)?.delete_student(&student_id, confirmed) {
        DeleteOutcome::ConfirmationRequired { full_name } => Err(HandlerErr::new(
            "confirmation_required",
            DELETE_CONFIRMATION,
        )
        .with_details(json!({ "studentId": student_id, "fullName": full_name }))),
        DeleteOutcome::NotFound => Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))),
        DeleteOutcome::Deleted {
            entries_removed,
            days_removed,
            closed_detail,
            persisted,
        } => Ok(json!({
            "deleted": true,
            "studentId": student_id,
            "attendanceEntriesRemoved": entries_removed,
            "attendanceDaysRemoved": days_removed,
            "closedDetail": closed_detail,
            "persisted": persisted,
        })),
    }
}

fn students_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let roster = roster_mut(state)?;
    roster.open_student(&student_id)?;
    let student = roster
        .student(&student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "student": to_json(student)? }))
}

fn students_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let roster = roster_mut(state)?;
    let was_open = roster.open_student_id().map(str::to_string);
    roster.close_student();
    Ok(json!({ "closed": was_open }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.schools" => students_schools(state),
        "students.get" => students_get(state, &req.params),
        "students.save" => students_save(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        "students.open" => students_open(state, &req.params),
        "students.close" => students_close(state),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
