use crate::approval::{self, QuestionEdit};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    client_id, get_optional_str, get_required_str, get_required_text, require_session, to_value,
};
use crate::ipc::types::{AppState, Request};
use crate::model::QuestionBody;
use crate::questions;
use crate::settings::Policy;
use serde_json::{json, Value};

/// Reads `type` + `payload`; both or neither must be present.
fn parse_body(params: &Value, policy: &Policy) -> Result<Option<QuestionBody>, HandlerErr> {
    let kind = get_optional_str(params, "type")?;
    let payload = params.get("payload").filter(|v| !v.is_null());
    match (kind, payload) {
        (None, None) => Ok(None),
        (Some(kind), Some(payload)) => Ok(Some(QuestionBody::parse(
            kind,
            payload,
            &policy.short_answer_subtypes,
        )?)),
        _ => Err(HandlerErr::bad_params("type and payload must be given together")),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let topic_id = get_required_str(&req.params, "topicId")?;
    let text = get_required_text(&req.params, "text")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    let policy = Policy::load(conn)?;
    let Some(body) = parse_body(&req.params, &policy)? else {
        return Err(HandlerErr::bad_params("missing type and payload"));
    };
    to_value(questions::create_question(
        conn, actor, &policy, id, topic_id, text, body,
    )?)
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let (conn, actor) = require_session(state)?;
    to_value(questions::get_question(conn, actor, question_id)?)
}

fn handle_edit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let (conn, actor) = require_session(state)?;
    let policy = Policy::load(conn)?;
    let text = match req.params.get("text") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(HandlerErr::bad_params("text must be a string")),
    };
    let edit = QuestionEdit {
        text,
        body: parse_body(&req.params, &policy)?,
    };
    to_value(approval::edit_question(
        conn,
        actor,
        &policy,
        question_id,
        edit,
    )?)
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let (conn, actor) = require_session(state)?;
    let comments = questions::delete_question(conn, actor, question_id)?;
    Ok(json!({ "ok": true, "removedComments": comments }))
}

fn handle_approve(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let question_id = get_required_str(&req.params, "questionId")?;
    let (conn, actor) = require_session(state)?;
    to_value(approval::approve_question(conn, actor, question_id)?)
}

fn handle_list_pending(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_optional_str(&req.params, "departmentId")?;
    let (conn, actor) = require_session(state)?;
    let items = questions::list_pending(conn, actor, department_id)?;
    Ok(json!({ "questions": to_value(items)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "questions.create" => handle_create(state, req),
        "questions.get" => handle_get(state, req),
        "questions.edit" => handle_edit(state, req),
        "questions.delete" => handle_delete(state, req),
        "questions.approve" => handle_approve(state, req),
        "questions.listPending" => handle_list_pending(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
