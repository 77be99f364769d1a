//! Question lifecycle: `pending` and `approved`, with no terminal state.
//!
//! Administrators approve. A teacher may only edit their own approved
//! question, and doing so sends it back to `pending` in the same statement
//! that writes the new content.

use rusqlite::Connection;
use serde::Serialize;

use crate::content;
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Identity, Question, QuestionBody, QuestionStatus, Role};
use crate::questions;
use crate::scope;
use crate::settings::Policy;

pub fn initial_status(role: Role, policy: &Policy) -> QuestionStatus {
    match role {
        Role::Admin if policy.admin_questions_start_approved => QuestionStatus::Approved,
        _ => QuestionStatus::Pending,
    }
}

/// Status a question moves to when `role` edits it.
pub fn status_after_edit(role: Role, current: QuestionStatus) -> StoreResult<QuestionStatus> {
    match (role, current) {
        (Role::Admin, s) => Ok(s),
        (Role::Teacher, QuestionStatus::Approved) => Ok(QuestionStatus::Pending),
        (Role::Teacher, QuestionStatus::Pending) => Err(StoreError::invalid_state(
            "question is awaiting approval; delete it or wait for review before editing",
        )),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub question: Question,
    pub changed: bool,
}

/// `pending -> approved`. Approving an approved question changes nothing.
pub fn approve_question(
    conn: &Connection,
    actor: &Identity,
    question_id: &str,
) -> StoreResult<Approval> {
    scope::require_admin(actor, "approve questions")?;

    let tx = conn.unchecked_transaction()?;
    let current = questions::load_question(&tx, question_id)?;
    if current.status == QuestionStatus::Approved {
        return Ok(Approval {
            question: current,
            changed: false,
        });
    }
    tx.execute(
        "UPDATE questions SET status = 'approved', approved_at = ?, approved_by = ?
         WHERE id = ? AND status = 'pending'",
        (db::now(), &actor.uid, question_id),
    )?;
    let question = questions::load_question(&tx, question_id)?;
    tx.commit()?;
    tracing::info!(question_id = %question_id, approver = %actor.uid, "question approved");

    Ok(Approval {
        question,
        changed: true,
    })
}

/// Replacement content for a question; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct QuestionEdit {
    pub text: Option<String>,
    pub body: Option<QuestionBody>,
}

pub fn edit_question(
    conn: &Connection,
    actor: &Identity,
    policy: &Policy,
    question_id: &str,
    edit: QuestionEdit,
) -> StoreResult<Question> {
    if edit.text.is_none() && edit.body.is_none() {
        return Err(StoreError::validation("nothing to change: pass text and/or a payload"));
    }
    let text = edit.text.as_deref().map(questions::required_text).transpose()?;
    if let Some(body) = &edit.body {
        body.validate(&policy.short_answer_subtypes)?;
    }

    let tx = conn.unchecked_transaction()?;
    let current = questions::load_question(&tx, question_id)?;
    let book = content::book_of_topic(&tx, &current.topic_id)?;
    content::require_book_access(&tx, actor, &book)?;
    if !actor.is_admin() && current.author_id != actor.uid {
        return Err(StoreError::forbidden(
            "teachers can only edit their own questions",
        ));
    }
    let next = status_after_edit(actor.role, current.status)?;

    let body = edit.body.unwrap_or(current.body);
    let demoted = current.status == QuestionStatus::Approved && next == QuestionStatus::Pending;

    // Content and status in one statement, guarded on the loaded status.
    let updated = tx.execute(
        "UPDATE questions
         SET text = ?1,
             kind = ?2,
             payload = ?3,
             status = ?4,
             edited_at = ?5,
             edited_by = ?6,
             approved_at = CASE WHEN ?7 THEN NULL ELSE approved_at END,
             approved_by = CASE WHEN ?7 THEN NULL ELSE approved_by END
         WHERE id = ?8 AND status = ?9",
        rusqlite::params![
            text.unwrap_or(current.text),
            body.kind(),
            body.payload_json()?,
            next.as_str(),
            db::now(),
            &actor.uid,
            demoted,
            question_id,
            current.status.as_str(),
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::invalid_state(
            "question changed while editing; reload and retry",
        ));
    }
    let question = questions::load_question(&tx, question_id)?;
    tx.commit()?;
    tracing::info!(
        question_id = %question_id,
        editor = %actor.uid,
        demoted,
        "question edited"
    );
    Ok(question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    fn create(f: &Fixture, actor: &Identity, topic: &str) -> Question {
        questions::create_question(
            &f.conn,
            actor,
            &f.policy(),
            None,
            topic,
            "Which is B?",
            QuestionBody::MultipleChoice {
                options: ["A".into(), "B".into(), "C".into(), "D".into()],
                correct_index: 1,
            },
        )
        .expect("question")
    }

    #[test]
    fn transition_table() {
        assert_eq!(
            status_after_edit(Role::Admin, QuestionStatus::Approved).unwrap(),
            QuestionStatus::Approved
        );
        assert_eq!(
            status_after_edit(Role::Admin, QuestionStatus::Pending).unwrap(),
            QuestionStatus::Pending
        );
        assert_eq!(
            status_after_edit(Role::Teacher, QuestionStatus::Approved).unwrap(),
            QuestionStatus::Pending
        );
        assert!(matches!(
            status_after_edit(Role::Teacher, QuestionStatus::Pending),
            Err(StoreError::InvalidState(_))
        ));
    }

    #[test]
    fn approve_is_admin_only_and_idempotent() {
        let f = Fixture::new();
        let c = f.chain();
        let q = create(&f, &f.teacher, &c.topic);
        assert!(matches!(
            approve_question(&f.conn, &f.teacher, &q.id),
            Err(StoreError::Forbidden(_))
        ));
        let first = approve_question(&f.conn, &f.admin, &q.id).expect("approve");
        assert!(first.changed);
        assert_eq!(first.question.status, QuestionStatus::Approved);
        assert_eq!(first.question.approved_by.as_deref(), Some(f.admin.uid.as_str()));
        let again = approve_question(&f.conn, &f.admin, &q.id).expect("approve again");
        assert!(!again.changed);
        assert_eq!(again.question, first.question);
        assert!(matches!(
            approve_question(&f.conn, &f.admin, "missing"),
            Err(StoreError::NotFound("question"))
        ));
    }

    #[test]
    fn teacher_edit_demotes_and_admin_edit_does_not() {
        let f = Fixture::new();
        let c = f.chain();
        let q = create(&f, &f.teacher, &c.topic);

        let pending_edit = edit_question(
            &f.conn,
            &f.teacher,
            &f.policy(),
            &q.id,
            QuestionEdit {
                text: Some("Which one is B?".into()),
                body: None,
            },
        );
        assert!(matches!(pending_edit, Err(StoreError::InvalidState(_))));

        approve_question(&f.conn, &f.admin, &q.id).expect("approve");
        let edited = edit_question(
            &f.conn,
            &f.teacher,
            &f.policy(),
            &q.id,
            QuestionEdit {
                text: None,
                body: Some(QuestionBody::TrueFalse { is_true: false }),
            },
        )
        .expect("teacher edit");
        assert_eq!(edited.status, QuestionStatus::Pending);
        assert_eq!(edited.text, "Which is B?");
        assert_eq!(edited.body, QuestionBody::TrueFalse { is_true: false });
        assert_eq!(edited.approved_at, None);
        assert_eq!(edited.edited_by.as_deref(), Some(f.teacher.uid.as_str()));

        approve_question(&f.conn, &f.admin, &q.id).expect("approve");
        let by_admin = edit_question(
            &f.conn,
            &f.admin,
            &f.policy(),
            &q.id,
            QuestionEdit {
                text: Some("Is B correct?".into()),
                body: None,
            },
        )
        .expect("admin edit");
        assert_eq!(by_admin.status, QuestionStatus::Approved);
        assert_eq!(by_admin.text, "Is B correct?");
        assert!(by_admin.approved_at.is_some());
    }

    #[test]
    fn colleague_cannot_edit_another_teachers_question() {
        let f = Fixture::new();
        let c = f.chain();
        let colleague = f.another_teacher("colleague@school.test");
        f.assign_to(
            &colleague,
            &[crate::scope::Assignment {
                department_id: c.department.clone(),
                grade_id: Some(c.grade.clone()),
                subject_id: None,
            }],
        );
        let q = create(&f, &f.teacher, &c.topic);
        approve_question(&f.conn, &f.admin, &q.id).expect("approve");

        let res = edit_question(
            &f.conn,
            &colleague,
            &f.policy(),
            &q.id,
            QuestionEdit {
                text: Some("Rewritten".into()),
                body: None,
            },
        );
        assert!(matches!(res, Err(StoreError::Forbidden(_))));

        let stored = questions::load_question(&f.conn, &q.id).expect("reload");
        assert_eq!(stored.status, QuestionStatus::Approved);
        assert_eq!(stored.text, "Which is B?");
    }

    #[test]
    fn empty_edit_is_rejected() {
        let f = Fixture::new();
        let c = f.chain();
        let q = create(&f, &f.admin, &c.topic);
        let res = edit_question(&f.conn, &f.admin, &f.policy(), &q.id, QuestionEdit::default());
        assert!(matches!(res, Err(StoreError::ValidationFailed(_))));
        let res = edit_question(
            &f.conn,
            &f.admin,
            &f.policy(),
            &q.id,
            QuestionEdit {
                text: Some("   ".into()),
                body: None,
            },
        );
        assert!(matches!(res, Err(StoreError::ValidationFailed(_))));
    }
}
