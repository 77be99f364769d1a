//! Review remarks on questions: one per author per question, changed only by
//! their author while the question's book is still in their scope.

use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Comment, Identity};
use crate::questions;

fn row_to_comment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: r.get(0)?,
        question_id: r.get(1)?,
        author_id: r.get(2)?,
        author_role: r.get(3)?,
        text: r.get(4)?,
        created_at: r.get(5)?,
        edited_at: r.get(6)?,
    })
}

fn find_comment(conn: &Connection, id: &str) -> StoreResult<Option<Comment>> {
    Ok(conn
        .query_row(
            "SELECT id, question_id, author_id, author_role, text, created_at, edited_at
             FROM comments WHERE id = ?",
            [id],
            row_to_comment,
        )
        .optional()?)
}

fn required_text(text: &str) -> StoreResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::validation("comment text must not be empty"));
    }
    Ok(text.to_string())
}

fn owned_comment(conn: &Connection, actor: &Identity, id: &str) -> StoreResult<Comment> {
    let comment = find_comment(conn, id)?.ok_or(StoreError::NotFound("comment"))?;
    if comment.author_id != actor.uid {
        return Err(StoreError::NotOwner);
    }
    questions::get_question(conn, actor, &comment.question_id)?;
    Ok(comment)
}

pub fn add_comment(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    question_id: &str,
    text: &str,
) -> StoreResult<Comment> {
    let text = required_text(text)?;
    questions::get_question(conn, actor, question_id)?;

    let tx = conn.unchecked_transaction()?;
    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM comments WHERE question_id = ? AND author_id = ?",
            (question_id, &actor.uid),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing_id) = existing {
        if client_id == Some(existing_id.as_str()) {
            return find_comment(&tx, &existing_id)?.ok_or(StoreError::NotFound("comment"));
        }
        return Err(StoreError::DuplicateAuthor);
    }
    if let Some(id) = client_id {
        if db::id_exists(&tx, "comments", id)? {
            return Err(StoreError::validation("id is already used by another comment"));
        }
    }

    let comment = Comment {
        id: db::new_id(client_id),
        question_id: question_id.to_string(),
        author_id: actor.uid.clone(),
        author_role: actor.role,
        text,
        created_at: db::now(),
        edited_at: None,
    };
    tx.execute(
        "INSERT INTO comments(id, question_id, author_id, author_role, text, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &comment.id,
            &comment.question_id,
            &comment.author_id,
            comment.author_role.as_str(),
            &comment.text,
            &comment.created_at,
        ),
    )?;
    tx.commit()?;
    tracing::info!(comment_id = %comment.id, question_id = %question_id, "comment added");
    Ok(comment)
}

pub fn edit_comment(
    conn: &Connection,
    actor: &Identity,
    comment_id: &str,
    text: &str,
) -> StoreResult<Comment> {
    let text = required_text(text)?;
    owned_comment(conn, actor, comment_id)?;
    conn.execute(
        "UPDATE comments SET text = ?, edited_at = ? WHERE id = ?",
        (&text, db::now(), comment_id),
    )?;
    find_comment(conn, comment_id)?.ok_or(StoreError::NotFound("comment"))
}

pub fn delete_comment(conn: &Connection, actor: &Identity, comment_id: &str) -> StoreResult<()> {
    owned_comment(conn, actor, comment_id)?;
    conn.execute("DELETE FROM comments WHERE id = ?", [comment_id])?;
    tracing::info!(comment_id = %comment_id, "comment deleted");
    Ok(())
}

pub fn list_comments(
    conn: &Connection,
    actor: &Identity,
    question_id: &str,
) -> StoreResult<Vec<Comment>> {
    questions::get_question(conn, actor, question_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, question_id, author_id, author_role, text, created_at, edited_at
         FROM comments
         WHERE question_id = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([question_id], row_to_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionBody, Role};
    use crate::testutil::Fixture;

    fn question(f: &Fixture, topic: &str) -> String {
        questions::create_question(
            &f.conn,
            &f.teacher,
            &f.policy(),
            None,
            topic,
            "Is light a wave?",
            QuestionBody::TrueFalse { is_true: true },
        )
        .expect("question")
        .id
    }

    #[test]
    fn one_comment_per_author_per_question() {
        let f = Fixture::new();
        let c = f.chain();
        let q = question(&f, &c.topic);

        let first = add_comment(&f.conn, &f.admin, None, &q, "Needs a source").expect("add");
        assert_eq!(first.author_role, Role::Admin);
        let second = add_comment(&f.conn, &f.admin, None, &q, "Another");
        assert!(matches!(second, Err(StoreError::DuplicateAuthor)));

        let teacher = add_comment(&f.conn, &f.teacher, None, &q, "Added one").expect("teacher");
        let listed = list_comments(&f.conn, &f.admin, &q).expect("list");
        assert_eq!(
            listed.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
            vec![first.id, teacher.id]
        );
    }

    #[test]
    fn retry_with_same_id_returns_existing() {
        let f = Fixture::new();
        let c = f.chain();
        let q = question(&f, &c.topic);
        let a = add_comment(&f.conn, &f.admin, Some("cm-1"), &q, "Check units").expect("add");
        let b = add_comment(&f.conn, &f.admin, Some("cm-1"), &q, "Check units").expect("retry");
        assert_eq!(a, b);
    }

    #[test]
    fn only_the_author_edits_or_deletes() {
        let f = Fixture::new();
        let c = f.chain();
        let q = question(&f, &c.topic);
        let cm = add_comment(&f.conn, &f.teacher, None, &q, "Draft").expect("add");

        assert!(matches!(
            edit_comment(&f.conn, &f.admin, &cm.id, "Hijack"),
            Err(StoreError::NotOwner)
        ));
        assert!(matches!(
            delete_comment(&f.conn, &f.admin, &cm.id),
            Err(StoreError::NotOwner)
        ));
        assert!(matches!(
            edit_comment(&f.conn, &f.teacher, "missing", "x"),
            Err(StoreError::NotFound("comment"))
        ));

        let edited = edit_comment(&f.conn, &f.teacher, &cm.id, "Final").expect("edit");
        assert_eq!(edited.text, "Final");
        assert!(edited.edited_at.is_some());

        delete_comment(&f.conn, &f.teacher, &cm.id).expect("delete");
        assert!(list_comments(&f.conn, &f.teacher, &q).expect("list").is_empty());
    }

    #[test]
    fn reused_id_on_another_question_is_a_validation_failure() {
        let f = Fixture::new();
        let c = f.chain();
        let first = question(&f, &c.topic);
        let second = question(&f, &c.topic);
        add_comment(&f.conn, &f.admin, Some("cm-1"), &first, "Check units").expect("add");

        let clash = add_comment(&f.conn, &f.admin, Some("cm-1"), &second, "Check units");
        assert!(matches!(clash, Err(StoreError::ValidationFailed(_))));
        assert!(list_comments(&f.conn, &f.admin, &second).expect("list").is_empty());
    }

    #[test]
    fn author_out_of_scope_cannot_change_old_remarks() {
        let f = Fixture::new();
        let c = f.chain();
        let q = question(&f, &c.topic);
        let cm = add_comment(&f.conn, &f.teacher, None, &q, "Draft").expect("add");
        f.assign(&[]);

        assert!(matches!(
            edit_comment(&f.conn, &f.teacher, &cm.id, "Later"),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            delete_comment(&f.conn, &f.teacher, &cm.id),
            Err(StoreError::Forbidden(_))
        ));
        let listed = list_comments(&f.conn, &f.admin, &q).expect("list");
        assert_eq!(listed[0].text, "Draft");
    }
}
