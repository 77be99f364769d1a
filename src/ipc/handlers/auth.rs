use crate::error::StoreError;
use crate::identity;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_required_text, require_db, require_session, to_value,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::{json, Value};

fn handle_login(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let email = get_required_str(&req.params, "email")?;
    let password = get_required_text(&req.params, "password")?;
    let conn = require_db(state)?;
    let user = identity::authenticate(conn, email, password)?;
    tracing::info!(user_id = %user.uid, role = user.role.as_str(), "signed in");
    let result = to_value(&user)?;
    state.session = Some(user);
    Ok(result)
}

fn handle_logout(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    if let Some(user) = state.session.take() {
        tracing::info!(user_id = %user.uid, "signed out");
    }
    Ok(json!({ "ok": true }))
}

/// Re-reads the signed-in user so role changes and removals show up.
fn handle_whoami(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let (Some(conn), Some(current)) = (state.db.as_ref(), state.session.as_ref()) else {
        return Ok(json!({ "identity": null }));
    };
    let fresh = match identity::get_user(conn, &current.uid) {
        Ok(user) => Some(user),
        Err(StoreError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let result = json!({ "identity": to_value(&fresh)? });
    state.session = fresh;
    Ok(result)
}

fn handle_change_password(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let old = get_required_text(&req.params, "oldPassword")?;
    let new = get_required_text(&req.params, "newPassword")?;
    let (conn, actor) = require_session(state)?;
    identity::change_password(conn, &actor.uid, old, new)?;
    Ok(json!({ "ok": true }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let email = get_required_str(&req.params, "email")?;
    let password = get_required_text(&req.params, "password")?;
    let role_raw = get_required_str(&req.params, "role")?;
    let Some(role) = Role::parse(role_raw) else {
        return Err(HandlerErr::bad_params("role must be admin or teacher"));
    };
    let display_name = get_optional_str(&req.params, "displayName")?.unwrap_or("");
    let conn = require_db(state)?;
    let user = identity::create_user(
        conn,
        state.session.as_ref(),
        email,
        password,
        role,
        display_name,
    )?;
    to_value(user)
}

fn handle_users_list(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let (conn, actor) = require_session(state)?;
    let users = identity::list_users(conn, actor)?;
    Ok(json!({ "users": to_value(users)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "auth.login" => handle_login(state, req),
        "auth.logout" => handle_logout(state, req),
        "auth.whoami" => handle_whoami(state, req),
        "auth.changePassword" => handle_change_password(state, req),
        "users.create" => handle_users_create(state, req),
        "users.list" => handle_users_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
