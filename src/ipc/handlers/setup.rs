use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::scope;
use crate::settings::{self, Section};
use serde_json::{Map, Value};

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let (conn, _actor) = require_session(state)?;
    let mut out = Map::new();
    for section in Section::ALL {
        out.insert(
            section.name().to_string(),
            settings::load_section(conn, section)?,
        );
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let section_raw = get_required_str(&req.params, "section")?;
    let Some(section) = Section::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch) = req.params.get("patch").and_then(Value::as_object) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let (conn, actor) = require_session(state)?;
    scope::require_admin(actor, "change workspace settings")?;

    match settings::update_section(conn, section, patch)? {
        Ok(current) => {
            tracing::info!(section = section.name(), "settings updated");
            Ok(current)
        }
        Err(msg) => Err(HandlerErr::bad_params(msg)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
