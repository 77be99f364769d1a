use crate::comments;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{client_id, get_required_str, get_required_text, require_session, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let (conn, actor) = require_session(state)?;
    let list = comments::list_comments(conn, actor, question_id)?;
    Ok(json!({ "comments": to_value(list)? }))
}

fn handle_add(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let text = get_required_text(&req.params, "text")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(comments::add_comment(conn, actor, id, question_id, text)?)
}

fn handle_edit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let comment_id = get_required_str(&req.params, "commentId")?;
    let text = get_required_text(&req.params, "text")?;
    let (conn, actor) = require_session(state)?;
    to_value(comments::edit_comment(conn, actor, comment_id, text)?)
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let comment_id = get_required_str(&req.params, "commentId")?;
    let (conn, actor) = require_session(state)?;
    comments::delete_comment(conn, actor, comment_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "comments.list" => handle_list(state, req),
        "comments.add" => handle_add(state, req),
        "comments.edit" => handle_edit(state, req),
        "comments.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
