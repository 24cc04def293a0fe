use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, reply, roster, HandlerErr};
use crate::ipc::types::{write_line, AppState, Reply, Request};
use crate::messages::{
    normalize_phone, whatsapp_link, DispatchError, DraftRequest, GenerationError, Recipient,
    DRAFT_FAILED_MESSAGE, EMPTY_DRAFT_MESSAGE,
};
use crate::model::Student;
use serde_json::json;

struct Addressee {
    recipient: Recipient,
    name: String,
    phone: Option<String>,
}

fn resolve_student<'a>(state: &'a AppState, params: &serde_json::Value) -> Result<&'a Student, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    roster(state)?.student(&student_id).ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })
}

/// `params.parent` when given, otherwise the mother, otherwise the father.
fn resolve_addressee(student: &Student, params: &serde_json::Value) -> Result<Addressee, HandlerErr> {
    let recipient = match get_optional_str(params, "parent")? {
        Some(raw) => Recipient::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("parent must be mother or father"))?,
        None => Recipient::default_for(student).ok_or_else(|| {
            HandlerErr::new("no_recipient", "student has no named parent")
                .with_details(json!({ "studentId": student.id }))
        })?,
    };
    let (name, phone) = recipient.contact(student).ok_or_else(|| {
        HandlerErr::new("no_recipient", "selected parent has no name")
            .with_details(json!({ "studentId": student.id, "parent": recipient }))
    })?;
    Ok(Addressee {
        recipient,
        name: name.to_string(),
        phone: phone.map(str::to_string),
    })
}

fn generator_unavailable() -> HandlerErr {
    HandlerErr::new("generator_unavailable", DispatchError::NotConfigured.to_string())
        .with_details(json!({ "fallbackMessage": DRAFT_FAILED_MESSAGE }))
}

fn draft_result(
    student_id: &str,
    addressee: &Addressee,
    result: Result<String, GenerationError>,
) -> Result<serde_json::Value, HandlerErr> {
    let (text, generated) = match result {
        Ok(text) => (text, true),
        Err(GenerationError::EmptyResponse) => (EMPTY_DRAFT_MESSAGE.to_string(), false),
        Err(e) => {
            return Err(HandlerErr::new("generation_failed", e.to_string())
                .with_details(json!({ "fallbackMessage": e.fallback_message() })))
        }
    };
    let link = addressee
        .phone
        .as_deref()
        .and_then(|phone| whatsapp_link(phone, &text));
    Ok(json!({
        "studentId": student_id,
        "parent": addressee.recipient,
        "parentName": addressee.name,
        "text": text,
        "generated": generated,
        "whatsappLink": link,
    }))
}

fn prepare_draft(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<(String, Addressee, DraftRequest), HandlerErr> {
    let student = resolve_student(state, params)?;
    let addressee = resolve_addressee(student, params)?;
    let topic = get_optional_str(params, "topic")?.unwrap_or_default();
    let draft = DraftRequest::new(&student.full_name, &addressee.name, &topic)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    if !state.drafts.is_configured() {
        return Err(generator_unavailable());
    }
    Ok((student.id.clone(), addressee, draft))
}

fn messages_draft(state: &mut AppState, req: &Request) -> Reply {
    let (student_id, addressee, draft) = match prepare_draft(state, &req.params) {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };

    let id = req.id.clone();
    let out = state.out.clone();
    let submitted = state.drafts.submit(draft, move |result| {
        let resp = match draft_result(&student_id, &addressee, result) {
            Ok(value) => ok(&id, value),
            Err(e) => e.response(&id),
        };
        write_line(&out, &resp);
    });
    match submitted {
        Ok(_) => Reply::Deferred,
        Err(DispatchError::InProgress) => Reply::Now(err(
            &req.id,
            "draft_in_progress",
            DispatchError::InProgress.to_string(),
            None,
        )),
        Err(DispatchError::NotConfigured) => Reply::Now(generator_unavailable().response(&req.id)),
        Err(e @ DispatchError::Spawn(_)) => Reply::Now(err(&req.id, "internal", e.to_string(), None)),
    }
}

fn messages_whatsapp_link(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student = resolve_student(state, params)?;
    let addressee = resolve_addressee(student, params)?;
    let text = params
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing text"))?;
    let phone = addressee.phone.as_deref().unwrap_or("");
    let url = whatsapp_link(phone, text).ok_or_else(|| {
        HandlerErr::new("no_phone", "selected parent has no usable phone number")
            .with_details(json!({ "studentId": student.id, "parent": addressee.recipient }))
    })?;
    Ok(json!({
        "url": url,
        "phone": normalize_phone(phone),
        "parent": addressee.recipient,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "messages.draft" => Some(messages_draft(state, req)),
        "messages.whatsappLink" => Some(Reply::Now(reply(
            &req.id,
            messages_whatsapp_link(state, &req.params),
        ))),
        _ => None,
    }
}
