use super::handlers;
use super::types::{AppState, Reply, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> Reply {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return Reply::Now(resp);
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return Reply::Now(resp);
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return Reply::Now(resp);
    }
    if let Some(resp) = handlers::calendar::try_handle(state, &req) {
        return Reply::Now(resp);
    }
    if let Some(reply) = handlers::messages::try_handle(state, &req) {
        return reply;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return Reply::Now(resp);
    }

    tracing::debug!(method = %req.method, "unknown method");
    Reply::Now(err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    ))
}
