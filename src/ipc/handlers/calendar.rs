use crate::calendar::CalendarError;
use crate::ipc::helpers::{reply, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Attendance;

impl From<CalendarError> for HandlerErr {
    fn from(e: CalendarError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

/// The month view; activity dots come from the open workspace, if any.
fn view(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let empty = Attendance::default();
    let attendance = state
        .workspace
        .as_ref()
        .map(|w| w.roster.attendance())
        .unwrap_or(&empty);
    to_json(&state.calendar.month_view(attendance))
}

fn int_param(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing integer {}", key)))
}

fn calendar_change_month(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    state.calendar.change_month(int_param(params, "delta")?)?;
    view(state)
}

fn calendar_select_day(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let day = u32::try_from(int_param(params, "day")?)
        .map_err(|_| HandlerErr::bad_params("day must be positive"))?;
    state.calendar.select_day(day)?;
    view(state)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "calendar.get" => view(state),
        "calendar.changeMonth" => calendar_change_month(state, &req.params),
        "calendar.selectDay" => calendar_select_day(state, &req.params),
        _ => return None,
    };
    Some(reply(&req.id, result))
}
