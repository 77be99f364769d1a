use crate::content;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    client_id, get_bool, get_required_str, get_required_text, get_str_list, require_session,
    to_value,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_books_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let grade_id = get_required_str(&req.params, "gradeId")?;
    let (conn, actor) = require_session(state)?;
    let books = content::list_books(conn, actor, department_id, grade_id)?;
    Ok(json!({ "books": to_value(books)? }))
}

fn handle_books_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(&req.params, "departmentId")?;
    let grade_id = get_required_str(&req.params, "gradeId")?;
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(content::create_book(
        conn,
        actor,
        id,
        department_id,
        grade_id,
        name,
    )?)
}

fn handle_books_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let book_id = get_required_str(&req.params, "bookId")?;
    let (conn, actor) = require_session(state)?;
    let removed = content::delete_book(conn, actor, book_id)?;
    Ok(json!({ "ok": true, "removed": to_value(removed)? }))
}

fn handle_books_tree(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let book_id = get_required_str(&req.params, "bookId")?;
    let include_unapproved = get_bool(&req.params, "includeUnapproved", false)?;
    let (conn, actor) = require_session(state)?;
    to_value(content::get_book_tree(
        conn,
        actor,
        book_id,
        include_unapproved,
    )?)
}

fn handle_chapters_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let book_id = get_required_str(&req.params, "bookId")?;
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(content::create_chapter(conn, actor, id, book_id, name)?)
}

fn handle_chapters_rename(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let chapter_id = get_required_str(&req.params, "chapterId")?;
    let name = get_required_text(&req.params, "name")?;
    let (conn, actor) = require_session(state)?;
    to_value(content::rename_chapter(conn, actor, chapter_id, name)?)
}

fn handle_chapters_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let chapter_id = get_required_str(&req.params, "chapterId")?;
    let (conn, actor) = require_session(state)?;
    let removed = content::delete_chapter(conn, actor, chapter_id)?;
    Ok(json!({ "ok": true, "removed": to_value(removed)? }))
}

fn handle_chapters_reorder(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let book_id = get_required_str(&req.params, "bookId")?;
    let ordered = get_str_list(&req.params, "chapterIds")?;
    let (conn, actor) = require_session(state)?;
    let chapters = content::reorder_chapters(conn, actor, book_id, &ordered)?;
    Ok(json!({ "chapters": to_value(chapters)? }))
}

fn handle_topics_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let chapter_id = get_required_str(&req.params, "chapterId")?;
    let name = get_required_text(&req.params, "name")?;
    let id = client_id(&req.params)?;
    let (conn, actor) = require_session(state)?;
    to_value(content::create_topic(conn, actor, id, chapter_id, name)?)
}

fn handle_topics_rename(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let topic_id = get_required_str(&req.params, "topicId")?;
    let name = get_required_text(&req.params, "name")?;
    let (conn, actor) = require_session(state)?;
    to_value(content::rename_topic(conn, actor, topic_id, name)?)
}

fn handle_topics_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let topic_id = get_required_str(&req.params, "topicId")?;
    let (conn, actor) = require_session(state)?;
    let removed = content::delete_topic(conn, actor, topic_id)?;
    Ok(json!({ "ok": true, "removed": to_value(removed)? }))
}

fn handle_topics_reorder(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let chapter_id = get_required_str(&req.params, "chapterId")?;
    let ordered = get_str_list(&req.params, "topicIds")?;
    let (conn, actor) = require_session(state)?;
    let topics = content::reorder_topics(conn, actor, chapter_id, &ordered)?;
    Ok(json!({ "topics": to_value(topics)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "books.list" => handle_books_list(state, req),
        "books.create" => handle_books_create(state, req),
        "books.delete" => handle_books_delete(state, req),
        "books.tree" => handle_books_tree(state, req),
        "chapters.create" => handle_chapters_create(state, req),
        "chapters.rename" => handle_chapters_rename(state, req),
        "chapters.delete" => handle_chapters_delete(state, req),
        "chapters.reorder" => handle_chapters_reorder(state, req),
        "topics.create" => handle_topics_create(state, req),
        "topics.rename" => handle_topics_rename(state, req),
        "topics.delete" => handle_topics_delete(state, req),
        "topics.reorder" => handle_topics_reorder(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
