use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::approval;
use crate::content;
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Identity, Question, QuestionBody, QuestionStatus};
use crate::scope;
use crate::settings::Policy;

/// Column list matching [`QuestionRow::from_row`]; expects the table alias `q`.
pub const QUESTION_COLUMNS: &str = "q.id, q.topic_id, q.text, q.kind, q.payload, q.author_id, \
     q.status, q.created_at, q.edited_at, q.edited_by, q.approved_at, q.approved_by";

/// A question row before its payload is decoded.
pub struct QuestionRow {
    id: String,
    topic_id: String,
    text: String,
    kind: String,
    payload: String,
    author_id: String,
    status: String,
    created_at: String,
    edited_at: Option<String>,
    edited_by: Option<String>,
    approved_at: Option<String>,
    approved_by: Option<String>,
}

impl QuestionRow {
    pub fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            topic_id: r.get(1)?,
            text: r.get(2)?,
            kind: r.get(3)?,
            payload: r.get(4)?,
            author_id: r.get(5)?,
            status: r.get(6)?,
            created_at: r.get(7)?,
            edited_at: r.get(8)?,
            edited_by: r.get(9)?,
            approved_at: r.get(10)?,
            approved_by: r.get(11)?,
        })
    }

    pub fn into_question(self) -> StoreResult<Question> {
        let body = QuestionBody::from_stored(&self.kind, &self.payload)?;
        let status = QuestionStatus::parse(&self.status).ok_or_else(|| {
            StoreError::invalid_state(format!("unknown question status {}", self.status))
        })?;
        Ok(Question {
            id: self.id,
            topic_id: self.topic_id,
            text: self.text,
            body,
            author_id: self.author_id,
            status,
            created_at: self.created_at,
            edited_at: self.edited_at,
            edited_by: self.edited_by,
            approved_at: self.approved_at,
            approved_by: self.approved_by,
        })
    }
}

pub(crate) fn find_question(conn: &Connection, id: &str) -> StoreResult<Option<Question>> {
    let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = ?");
    let row = conn
        .query_row(&sql, [id], QuestionRow::from_row)
        .optional()?;
    row.map(QuestionRow::into_question).transpose()
}

pub(crate) fn load_question(conn: &Connection, id: &str) -> StoreResult<Question> {
    find_question(conn, id)?.ok_or(StoreError::NotFound("question"))
}

/// Loads a question and checks the actor may see its book.
pub fn get_question(conn: &Connection, actor: &Identity, id: &str) -> StoreResult<Question> {
    let question = load_question(conn, id)?;
    let book = content::book_of_topic(conn, &question.topic_id)?;
    content::require_book_access(conn, actor, &book)?;
    Ok(question)
}

pub(crate) fn required_text(text: &str) -> StoreResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::validation("question text must not be empty"));
    }
    Ok(text.to_string())
}

/// Inserts a validated question. Callers own the transaction.
pub(crate) fn insert_question(
    conn: &Connection,
    actor: &Identity,
    status: QuestionStatus,
    id: String,
    topic_id: &str,
    text: String,
    body: QuestionBody,
) -> StoreResult<Question> {
    let question = Question {
        id,
        topic_id: topic_id.to_string(),
        text,
        author_id: actor.uid.clone(),
        status,
        created_at: db::now(),
        edited_at: None,
        edited_by: None,
        approved_at: None,
        approved_by: None,
        body,
    };
    let (approved_at, approved_by) = match status {
        QuestionStatus::Approved => (Some(question.created_at.clone()), Some(actor.uid.clone())),
        QuestionStatus::Pending => (None, None),
    };
    conn.execute(
        "INSERT INTO questions(id, topic_id, text, kind, payload, author_id, status, created_at, approved_at, approved_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &question.id,
            &question.topic_id,
            &question.text,
            question.body.kind(),
            question.body.payload_json()?,
            &question.author_id,
            status.as_str(),
            &question.created_at,
            &approved_at,
            &approved_by,
        ),
    )?;
    Ok(Question {
        approved_at,
        approved_by,
        ..question
    })
}

pub fn create_question(
    conn: &Connection,
    actor: &Identity,
    policy: &Policy,
    client_id: Option<&str>,
    topic_id: &str,
    text: &str,
    body: QuestionBody,
) -> StoreResult<Question> {
    let text = required_text(text)?;
    body.validate(&policy.short_answer_subtypes)?;
    let book = content::book_of_topic(conn, topic_id)?;
    content::require_book_access(conn, actor, &book)?;

    let tx = conn.unchecked_transaction()?;
    if let Some(id) = client_id {
        if let Some(existing) = find_question(&tx, id)? {
            if existing.topic_id == topic_id && existing.author_id == actor.uid {
                return Ok(existing);
            }
            return Err(StoreError::validation("id is already used by another question"));
        }
    }
    let status = approval::initial_status(actor.role, policy);
    let question = insert_question(
        &tx,
        actor,
        status,
        db::new_id(client_id),
        topic_id,
        text,
        body,
    )?;
    tx.commit()?;
    tracing::info!(
        question_id = %question.id,
        topic_id = %topic_id,
        status = status.as_str(),
        "question created"
    );
    Ok(question)
}

/// Administrators delete any question; teachers only their own.
pub fn delete_question(conn: &Connection, actor: &Identity, id: &str) -> StoreResult<usize> {
    let question = get_question(conn, actor, id)?;
    if !actor.is_admin() && question.author_id != actor.uid {
        return Err(StoreError::forbidden(
            "teachers can only delete their own questions",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let comments = tx.execute("DELETE FROM comments WHERE question_id = ?", [id])?;
    tx.execute("DELETE FROM questions WHERE id = ?", [id])?;
    tx.commit()?;
    tracing::info!(question_id = %id, comments, "question deleted");
    Ok(comments)
}

/// A pending question with enough context to review it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    #[serde(flatten)]
    pub question: Question,
    pub book_id: String,
    pub book_name: String,
    pub department_id: String,
    pub grade_id: String,
    pub chapter_name: String,
    pub topic_name: String,
}

/// The administrator's approval queue, oldest first.
pub fn list_pending(
    conn: &Connection,
    actor: &Identity,
    department_id: Option<&str>,
) -> StoreResult<Vec<ReviewItem>> {
    scope::require_admin(actor, "review pending questions")?;
    let sql = format!(
        "SELECT {QUESTION_COLUMNS}, b.id, b.name, b.department_id, b.grade_id, c.name, t.name
         FROM questions q
         JOIN topics t ON t.id = q.topic_id
         JOIN chapters c ON c.id = t.chapter_id
         JOIN books b ON b.id = c.book_id
         WHERE q.status = 'pending' AND (?1 IS NULL OR b.department_id = ?1)
         ORDER BY q.created_at, q.rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([department_id], |r| {
            Ok((
                QuestionRow::from_row(r)?,
                r.get::<_, String>(12)?,
                r.get::<_, String>(13)?,
                r.get::<_, String>(14)?,
                r.get::<_, String>(15)?,
                r.get::<_, String>(16)?,
                r.get::<_, String>(17)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(row, book_id, book_name, department_id, grade_id, chapter_name, topic_name)| {
                Ok(ReviewItem {
                    question: row.into_question()?,
                    book_id,
                    book_name,
                    department_id,
                    grade_id,
                    chapter_name,
                    topic_name,
                })
            },
        )
        .collect()
}
