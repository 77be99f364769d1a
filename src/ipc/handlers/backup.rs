use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::scope;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_export_bundle(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(&req.params, "outPath")?);
    let (conn, actor) = require_session(state)?;
    scope::require_admin(actor, "export the workspace")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let export = backup::export_workspace_bundle(conn, &workspace_path, &out_path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string())
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "counts": export.counts,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(&req.params, "inPath")?);
    {
        let (_conn, actor) = require_session(state)?;
        scope::require_admin(actor, "restore the workspace")?;
    }
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    if !in_path.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path.to_string_lossy() })));
    }

    // Drop open handle before replacing file.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace_path);
    // The previous database is still in place when the import failed.
    let conn = db::open_db(&workspace_path)
        .map_err(|e| HandlerErr::new("db_open_failed", e.to_string()))?;
    state.db = Some(conn);

    let import = imported.map_err(|e| {
        HandlerErr::new("io_failed", e.to_string())
            .with_details(json!({ "path": in_path.to_string_lossy() }))
    })?;
    // Users come from the restored database.
    state.session = None;
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormat": import.bundle_format,
        "exportedAt": import.exported_at,
        "counts": import.counts,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "workspace.exportBundle" => handle_export_bundle(state, req),
        "workspace.importBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
