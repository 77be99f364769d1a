use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    client_id, get_required_str, get_required_text, require_session, to_value,
};
use crate::ipc::types::{AppState, Request};
use crate::taxonomy;
use serde_json::{json, Value};

fn handle_departments_list(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let (conn, actor) = require_session(state)?;
    let departments = taxonomy::list_departments(conn, actor)?;
    Ok(json!({ "departments": to_value(departments)? }))
}

fn handle_departments_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(taxonomy::create_department(conn, actor, id, name)?)
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let (conn, actor) = require_session(state)?;
    let grades = taxonomy::list_grades(conn, actor, department_id)?;
    Ok(json!({ "grades": to_value(grades)? }))
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(taxonomy::create_grade(conn, actor, id, department_id, name)?)
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let grade_id = get_required_str(&req.params, "gradeId")?;
    let (conn, actor) = require_session(state)?;
    let subjects = taxonomy::list_subjects(conn, actor, department_id, grade_id)?;
    Ok(json!({ "subjects": to_value(subjects)? }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let grade_id = get_required_str(&req.params, "gradeId")?;
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(taxonomy::create_subject(
        conn,
        actor,
        id,
        department_id,
        grade_id,
        name,
    )?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "departments.list" => handle_departments_list(state, req),
        "departments.create" => handle_departments_create(state, req),
        "grades.list" => handle_grades_list(state, req),
        "grades.create" => handle_grades_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
