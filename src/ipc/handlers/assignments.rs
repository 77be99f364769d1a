use crate::error::StoreError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session, to_value};
use crate::ipc::types::{AppState, Request};
use crate::scope::{self, Assignment};
use serde_json::{json, Value};

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    let (conn, actor) = require_session(state)?;
    if !actor.is_admin() && actor.uid != teacher_id {
        return Err(StoreError::forbidden("teachers can only view their own assignments").into());
    }
    let assignments = scope::list_assignments(conn, teacher_id)?;
    let resolved = scope::get_scope(conn, teacher_id)?;
    Ok(json!({
        "assignments": to_value(assignments)?,
        "scope": to_value(resolved)?,
    }))
}

fn handle_set(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    let raw = req
        .params
        .get("assignments")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing assignments"))?;
    let assignments: Vec<Assignment> = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::bad_params(format!("assignments: {e}")))?;
    let (conn, actor) = require_session(state)?;
    let resolved = scope::set_assignments(conn, actor, teacher_id, &assignments)?;
    Ok(json!({ "scope": to_value(resolved)? }))
}

/// The caller's own scope; administrators are unrestricted.
fn handle_scope_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let (conn, actor) = require_session(state)?;
    match scope::scope_for(conn, actor)? {
        Some(resolved) => Ok(json!({ "unrestricted": false, "scope": to_value(resolved)? })),
        None => Ok(json!({ "unrestricted": true, "scope": null })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "assignments.get" => handle_get(state, req),
        "assignments.set" => handle_set(state, req),
        "scope.get" => handle_scope_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
