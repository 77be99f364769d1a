use rusqlite::Connection;
use serde_json::Value;

use crate::error::StoreError;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::Identity;

pub fn get_required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    match params.get(key).and_then(Value::as_str) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim()),
        _ => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

/// Text fields are passed through untrimmed so stores report empties
/// as validation failures.
pub fn get_required_text<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn get_optional_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim())),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be a string"))),
    }
}

pub fn get_bool(params: &Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be boolean"))),
    }
}

pub fn get_str_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(Value::as_array) else {
        return Err(HandlerErr::bad_params(format!("{key} must be an array")));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| HandlerErr::bad_params(format!("{key} must contain strings")))
        })
        .collect()
}

/// Client-supplied id that makes a create safe to retry.
pub fn client_id(params: &Value) -> Result<Option<&str>, HandlerErr> {
    get_optional_str(params, "id")
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(state: &AppState) -> Result<(&Connection, &Identity), HandlerErr> {
    let conn = require_db(state)?;
    let actor = state
        .session
        .as_ref()
        .ok_or(StoreError::NotAuthenticated)?;
    Ok((conn, actor))
}

pub fn to_value<T: serde::Serialize>(value: T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::from(StoreError::from(e)))
}
