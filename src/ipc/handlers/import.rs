use crate::import;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_session, to_value};
use crate::ipc::types::{AppState, Request};
use crate::settings::Policy;
use serde_json::{json, Value};

/// CSV comes inline as `text` or from a file at `path`.
fn read_source(params: &Value) -> Result<String, HandlerErr> {
    if let Some(text) = params.get("text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    let Some(path) = get_optional_str(params, "path")? else {
        return Err(HandlerErr::bad_params("missing text or path"));
    };
    std::fs::read_to_string(path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": path }))
    })
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let topic_id = get_required_str(&req.params, "topicId")?;
    let text = read_source(&req.params)?;
    let (conn, actor) = require_session(state)?;
    let policy = Policy::load(conn)?;
    to_value(import::import_questions(
        conn, actor, &policy, topic_id, &text,
    )?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "questions.importCsv" => handle_import_csv(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
