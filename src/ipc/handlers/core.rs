use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "signedIn": state.session.is_some(),
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(&req.params, "path")?);
    let conn = db::open_db(&path).map_err(|e| {
        HandlerErr::new("db_open_failed", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let users = crate::identity::user_count(&conn)?;

    // A different workspace has different users.
    state.session = None;
    state.db = Some(conn);
    state.workspace = Some(path.clone());
    tracing::info!(workspace = %path.display(), users, "workspace selected");

    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "needsBootstrap": users == 0,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
