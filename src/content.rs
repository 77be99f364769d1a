//! Books and their ordered chapters and topics.

use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Book, Chapter, Identity, Question, Topic};
use crate::questions::{QuestionRow, QUESTION_COLUMNS};
use crate::scope;
use crate::taxonomy;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTree {
    #[serde(flatten)]
    pub book: Book,
    pub chapters: Vec<ChapterNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterNode {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub topics: Vec<TopicNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicNode {
    #[serde(flatten)]
    pub topic: Topic,
    pub questions: Vec<Question>,
}

/// Row counts removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Removed {
    pub chapters: usize,
    pub topics: usize,
    pub questions: usize,
    pub comments: usize,
}

fn required_name(name: &str, entity: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation(format!(
            "{entity} name must not be empty"
        )));
    }
    Ok(name.to_string())
}

fn row_to_book(r: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: r.get(0)?,
        name: r.get(1)?,
        department_id: r.get(2)?,
        grade_id: r.get(3)?,
        created_by: r.get(4)?,
        created_at: r.get(5)?,
    })
}

fn row_to_chapter(r: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: r.get(0)?,
        name: r.get(1)?,
        book_id: r.get(2)?,
        order: r.get(3)?,
    })
}

fn row_to_topic(r: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: r.get(0)?,
        name: r.get(1)?,
        chapter_id: r.get(2)?,
        order: r.get(3)?,
    })
}

pub fn get_book(conn: &Connection, id: &str) -> StoreResult<Book> {
    conn.query_row(
        "SELECT id, name, department_id, grade_id, created_by, created_at FROM books WHERE id = ?",
        [id],
        row_to_book,
    )
    .optional()?
    .ok_or(StoreError::NotFound("book"))
}

fn find_chapter(conn: &Connection, id: &str) -> StoreResult<Option<Chapter>> {
    Ok(conn
        .query_row(
            "SELECT id, name, book_id, sort_order FROM chapters WHERE id = ?",
            [id],
            row_to_chapter,
        )
        .optional()?)
}

fn find_topic(conn: &Connection, id: &str) -> StoreResult<Option<Topic>> {
    Ok(conn
        .query_row(
            "SELECT id, name, chapter_id, sort_order FROM topics WHERE id = ?",
            [id],
            row_to_topic,
        )
        .optional()?)
}

pub fn get_chapter(conn: &Connection, id: &str) -> StoreResult<Chapter> {
    find_chapter(conn, id)?.ok_or(StoreError::NotFound("chapter"))
}

pub fn get_topic(conn: &Connection, id: &str) -> StoreResult<Topic> {
    find_topic(conn, id)?.ok_or(StoreError::NotFound("topic"))
}

/// Fails `Forbidden` unless the actor may act on the book's department/grade.
pub fn require_book_access(conn: &Connection, actor: &Identity, book: &Book) -> StoreResult<()> {
    scope::require_grade(conn, actor, &book.department_id, &book.grade_id)
}

pub fn book_of_chapter(conn: &Connection, chapter_id: &str) -> StoreResult<Book> {
    let chapter = get_chapter(conn, chapter_id)?;
    get_book(conn, &chapter.book_id)
}

pub fn book_of_topic(conn: &Connection, topic_id: &str) -> StoreResult<Book> {
    let topic = get_topic(conn, topic_id)?;
    book_of_chapter(conn, &topic.chapter_id)
}

pub fn create_book(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    department_id: &str,
    grade_id: &str,
    name: &str,
) -> StoreResult<Book> {
    let name = required_name(name, "book")?;
    taxonomy::require_grade_in_department(conn, department_id, grade_id)?;
    scope::require_grade(conn, actor, department_id, grade_id)?;

    if let Some(id) = client_id {
        match get_book(conn, id) {
            Ok(existing) if existing.department_id == department_id && existing.grade_id == grade_id => {
                return Ok(existing);
            }
            Ok(_) => return Err(StoreError::validation("id is already used by another book")),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let book = Book {
        id: db::new_id(client_id),
        name,
        department_id: department_id.to_string(),
        grade_id: grade_id.to_string(),
        created_by: actor.uid.clone(),
        created_at: db::now(),
    };
    conn.execute(
        "INSERT INTO books(id, department_id, grade_id, name, created_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &book.id,
            &book.department_id,
            &book.grade_id,
            &book.name,
            &book.created_by,
            &book.created_at,
        ),
    )?;
    tracing::info!(book_id = %book.id, grade_id = %grade_id, "book created");
    Ok(book)
}

pub fn list_books(
    conn: &Connection,
    actor: &Identity,
    department_id: &str,
    grade_id: &str,
) -> StoreResult<Vec<Book>> {
    taxonomy::require_grade_in_department(conn, department_id, grade_id)?;
    scope::require_grade(conn, actor, department_id, grade_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, department_id, grade_id, created_by, created_at
         FROM books
         WHERE department_id = ? AND grade_id = ?
         ORDER BY lower(name), created_at, rowid",
    )?;
    let books = stmt
        .query_map((department_id, grade_id), row_to_book)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(books)
}

fn delete_chapter_rows(tx: &Transaction<'_>, chapter_id: &str) -> StoreResult<Removed> {
    let comments = tx.execute(
        "DELETE FROM comments
         WHERE question_id IN (
           SELECT q.id
           FROM questions q
           JOIN topics t ON t.id = q.topic_id
           WHERE t.chapter_id = ?
         )",
        [chapter_id],
    )?;
    let questions = tx.execute(
        "DELETE FROM questions
         WHERE topic_id IN (SELECT id FROM topics WHERE chapter_id = ?)",
        [chapter_id],
    )?;
    let topics = tx.execute("DELETE FROM topics WHERE chapter_id = ?", [chapter_id])?;
    let chapters = tx.execute("DELETE FROM chapters WHERE id = ?", [chapter_id])?;
    Ok(Removed {
        chapters,
        topics,
        questions,
        comments,
    })
}

pub fn delete_book(conn: &Connection, actor: &Identity, book_id: &str) -> StoreResult<Removed> {
    scope::require_admin(actor, "delete books")?;
    get_book(conn, book_id)?;

    let tx = conn.unchecked_transaction()?;
    let chapter_ids = {
        let mut stmt = tx.prepare("SELECT id FROM chapters WHERE book_id = ?")?;
        let ids = stmt
            .query_map([book_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    let mut removed = Removed::default();
    for chapter_id in &chapter_ids {
        let r = delete_chapter_rows(&tx, chapter_id)?;
        removed.chapters += r.chapters;
        removed.topics += r.topics;
        removed.questions += r.questions;
        removed.comments += r.comments;
    }
    tx.execute("DELETE FROM books WHERE id = ?", [book_id])?;
    tx.commit()?;
    tracing::info!(book_id = %book_id, chapters = removed.chapters, "book deleted");
    Ok(removed)
}

pub fn create_chapter(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    book_id: &str,
    name: &str,
) -> StoreResult<Chapter> {
    let name = required_name(name, "chapter")?;
    let book = get_book(conn, book_id)?;
    require_book_access(conn, actor, &book)?;

    let tx = conn.unchecked_transaction()?;
    if let Some(id) = client_id {
        if let Some(existing) = find_chapter(&tx, id)? {
            if existing.book_id == book_id {
                return Ok(existing);
            }
            return Err(StoreError::validation("id is already used by another chapter"));
        }
    }
    let order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM chapters WHERE book_id = ?",
        [book_id],
        |r| r.get(0),
    )?;
    let chapter = Chapter {
        id: db::new_id(client_id),
        name,
        book_id: book_id.to_string(),
        order,
    };
    tx.execute(
        "INSERT INTO chapters(id, book_id, name, sort_order) VALUES(?, ?, ?, ?)",
        (&chapter.id, book_id, &chapter.name, order),
    )?;
    tx.commit()?;
    tracing::info!(chapter_id = %chapter.id, book_id = %book_id, order, "chapter created");
    Ok(chapter)
}

pub fn rename_chapter(
    conn: &Connection,
    actor: &Identity,
    chapter_id: &str,
    name: &str,
) -> StoreResult<Chapter> {
    let name = required_name(name, "chapter")?;
    let book = book_of_chapter(conn, chapter_id)?;
    require_book_access(conn, actor, &book)?;
    conn.execute(
        "UPDATE chapters SET name = ? WHERE id = ?",
        (&name, chapter_id),
    )?;
    get_chapter(conn, chapter_id)
}

pub fn delete_chapter(
    conn: &Connection,
    actor: &Identity,
    chapter_id: &str,
) -> StoreResult<Removed> {
    let book = book_of_chapter(conn, chapter_id)?;
    require_book_access(conn, actor, &book)?;

    let tx = conn.unchecked_transaction()?;
    let removed = delete_chapter_rows(&tx, chapter_id)?;
    tx.commit()?;
    tracing::info!(chapter_id = %chapter_id, topics = removed.topics, "chapter deleted");
    Ok(removed)
}

pub fn create_topic(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    chapter_id: &str,
    name: &str,
) -> StoreResult<Topic> {
    let name = required_name(name, "topic")?;
    let book = book_of_chapter(conn, chapter_id)?;
    require_book_access(conn, actor, &book)?;

    let tx = conn.unchecked_transaction()?;
    if let Some(id) = client_id {
        if let Some(existing) = find_topic(&tx, id)? {
            if existing.chapter_id == chapter_id {
                return Ok(existing);
            }
            return Err(StoreError::validation("id is already used by another topic"));
        }
    }
    let order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM topics WHERE chapter_id = ?",
        [chapter_id],
        |r| r.get(0),
    )?;
    let topic = Topic {
        id: db::new_id(client_id),
        name,
        chapter_id: chapter_id.to_string(),
        order,
    };
    tx.execute(
        "INSERT INTO topics(id, chapter_id, name, sort_order) VALUES(?, ?, ?, ?)",
        (&topic.id, chapter_id, &topic.name, order),
    )?;
    tx.commit()?;
    tracing::info!(topic_id = %topic.id, chapter_id = %chapter_id, order, "topic created");
    Ok(topic)
}

pub fn rename_topic(
    conn: &Connection,
    actor: &Identity,
    topic_id: &str,
    name: &str,
) -> StoreResult<Topic> {
    let name = required_name(name, "topic")?;
    let book = book_of_topic(conn, topic_id)?;
    require_book_access(conn, actor, &book)?;
    conn.execute("UPDATE topics SET name = ? WHERE id = ?", (&name, topic_id))?;
    get_topic(conn, topic_id)
}

pub fn delete_topic(conn: &Connection, actor: &Identity, topic_id: &str) -> StoreResult<Removed> {
    let book = book_of_topic(conn, topic_id)?;
    require_book_access(conn, actor, &book)?;

    let tx = conn.unchecked_transaction()?;
    let comments = tx.execute(
        "DELETE FROM comments
         WHERE question_id IN (SELECT id FROM questions WHERE topic_id = ?)",
        [topic_id],
    )?;
    let questions = tx.execute("DELETE FROM questions WHERE topic_id = ?", [topic_id])?;
    let topics = tx.execute("DELETE FROM topics WHERE id = ?", [topic_id])?;
    tx.commit()?;
    tracing::info!(topic_id = %topic_id, questions, "topic deleted");
    Ok(Removed {
        chapters: 0,
        topics,
        questions,
        comments,
    })
}

/// Renumbers `table` rows under one parent to `1..=n` in the given order.
/// `ordered_ids` must be a permutation of the current children.
fn renumber(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    parent_id: &str,
    ordered_ids: &[String],
) -> StoreResult<()> {
    let current: HashSet<String> = {
        let sql = format!("SELECT id FROM {table} WHERE {parent_column} = ?");
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([parent_id], |r| r.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        ids
    };
    let requested: HashSet<String> = ordered_ids.iter().cloned().collect();
    if requested.len() != ordered_ids.len() || requested != current {
        return Err(StoreError::validation(format!(
            "order must list every {table} id of the parent exactly once"
        )));
    }

    // Two passes so the UNIQUE(parent, sort_order) index never sees a collision.
    let tx = conn.unchecked_transaction()?;
    let sql = format!("UPDATE {table} SET sort_order = ? WHERE id = ?");
    for (i, id) in ordered_ids.iter().enumerate() {
        tx.execute(&sql, (-(i as i64) - 1, id))?;
    }
    for (i, id) in ordered_ids.iter().enumerate() {
        tx.execute(&sql, (i as i64 + 1, id))?;
    }
    tx.commit()?;
    Ok(())
}

pub fn reorder_chapters(
    conn: &Connection,
    actor: &Identity,
    book_id: &str,
    ordered_ids: &[String],
) -> StoreResult<Vec<Chapter>> {
    let book = get_book(conn, book_id)?;
    require_book_access(conn, actor, &book)?;
    renumber(conn, "chapters", "book_id", book_id, ordered_ids)?;
    tracing::info!(book_id = %book_id, count = ordered_ids.len(), "chapters reordered");
    list_chapters(conn, book_id)
}

pub fn reorder_topics(
    conn: &Connection,
    actor: &Identity,
    chapter_id: &str,
    ordered_ids: &[String],
) -> StoreResult<Vec<Topic>> {
    let book = book_of_chapter(conn, chapter_id)?;
    require_book_access(conn, actor, &book)?;
    renumber(conn, "topics", "chapter_id", chapter_id, ordered_ids)?;
    tracing::info!(chapter_id = %chapter_id, count = ordered_ids.len(), "topics reordered");
    list_topics(conn, chapter_id)
}

fn list_chapters(conn: &Connection, book_id: &str) -> StoreResult<Vec<Chapter>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, book_id, sort_order FROM chapters
         WHERE book_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([book_id], row_to_chapter)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn list_topics(conn: &Connection, chapter_id: &str) -> StoreResult<Vec<Topic>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, chapter_id, sort_order FROM topics
         WHERE chapter_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([chapter_id], row_to_topic)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The nested book structure. Unapproved questions are only included when
/// asked for; the filter is part of the query.
pub fn get_book_tree(
    conn: &Connection,
    actor: &Identity,
    book_id: &str,
    include_unapproved: bool,
) -> StoreResult<BookTree> {
    let book = get_book(conn, book_id)?;
    require_book_access(conn, actor, &book)?;

    let chapters = list_chapters(conn, book_id)?;

    let mut topic_stmt = conn.prepare(
        "SELECT t.id, t.name, t.chapter_id, t.sort_order
         FROM topics t
         JOIN chapters c ON c.id = t.chapter_id
         WHERE c.book_id = ?
         ORDER BY t.sort_order, t.rowid",
    )?;
    let topics = topic_stmt
        .query_map([book_id], row_to_topic)?
        .collect::<Result<Vec<_>, _>>()?;

    let sql = format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions q
         JOIN topics t ON t.id = q.topic_id
         JOIN chapters c ON c.id = t.chapter_id
         WHERE c.book_id = ?1 AND (?2 OR q.status = 'approved')
         ORDER BY q.created_at, q.rowid"
    );
    let mut question_stmt = conn.prepare(&sql)?;
    let rows = question_stmt
        .query_map((book_id, include_unapproved), QuestionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut questions_by_topic: HashMap<String, Vec<Question>> = HashMap::new();
    for row in rows {
        let q = row.into_question()?;
        questions_by_topic
            .entry(q.topic_id.clone())
            .or_default()
            .push(q);
    }

    let mut topics_by_chapter: HashMap<String, Vec<TopicNode>> = HashMap::new();
    for topic in topics {
        let questions = questions_by_topic.remove(&topic.id).unwrap_or_default();
        topics_by_chapter
            .entry(topic.chapter_id.clone())
            .or_default()
            .push(TopicNode { topic, questions });
    }

    let chapters = chapters
        .into_iter()
        .map(|chapter| {
            let topics = topics_by_chapter.remove(&chapter.id).unwrap_or_default();
            ChapterNode { chapter, topics }
        })
        .collect();

    Ok(BookTree { book, chapters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval;
    use crate::model::QuestionBody;
    use crate::questions;
    use crate::scope::Assignment;
    use crate::testutil::Fixture;

    fn tf(f: &Fixture, actor: &Identity, topic: &str, text: &str) -> Question {
        questions::create_question(
            &f.conn,
            actor,
            &f.policy(),
            None,
            topic,
            text,
            QuestionBody::TrueFalse { is_true: true },
        )
        .expect("question")
    }

    #[test]
    fn orders_increase_per_sibling_group() {
        let f = Fixture::new();
        let c = f.chain();
        let second = create_chapter(&f.conn, &f.teacher, None, &c.book, "Forces").expect("ch2");
        let third = create_chapter(&f.conn, &f.teacher, None, &c.book, "Energy").expect("ch3");
        assert_eq!(get_chapter(&f.conn, &c.chapter).expect("ch1").order, 1);
        assert_eq!(second.order, 2);
        assert_eq!(third.order, 3);

        let t2 = create_topic(&f.conn, &f.teacher, None, &c.chapter, "Acceleration").expect("t2");
        assert_eq!(t2.order, 2);
        let other = create_topic(&f.conn, &f.teacher, None, &second.id, "Friction").expect("t");
        assert_eq!(other.order, 1);

        // Deleting leaves a gap; the next sibling still goes after the max.
        delete_chapter(&f.conn, &f.teacher, &second.id).expect("delete");
        let fourth = create_chapter(&f.conn, &f.teacher, None, &c.book, "Waves").expect("ch4");
        assert_eq!(fourth.order, 4);
    }

    #[test]
    fn tree_round_trips_structure_and_filters_pending() {
        let f = Fixture::new();
        let c = f.chain();
        let t2 = create_topic(&f.conn, &f.teacher, None, &c.chapter, "Acceleration").expect("t2");
        let pending = tf(&f, &f.teacher, &c.topic, "Speed is scalar");
        let approved = tf(&f, &f.teacher, &t2.id, "Velocity is a vector");
        approval::approve_question(&f.conn, &f.admin, &approved.id).expect("approve");

        let full = get_book_tree(&f.conn, &f.teacher, &c.book, true).expect("tree");
        assert_eq!(full.book.name, "Physics_101");
        assert_eq!(full.chapters.len(), 1);
        let topics = &full.chapters[0].topics;
        assert_eq!(
            topics.iter().map(|t| t.topic.order).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(topics[0].questions[0].id, pending.id);
        assert_eq!(topics[1].questions[0].id, approved.id);

        let public = get_book_tree(&f.conn, &f.teacher, &c.book, false).expect("tree");
        let topics = &public.chapters[0].topics;
        assert!(topics[0].questions.is_empty());
        assert_eq!(topics[1].questions.len(), 1);
    }

    #[test]
    fn retried_creates_return_the_first_result() {
        let f = Fixture::new();
        let c = f.chain();
        let a = create_chapter(&f.conn, &f.teacher, Some("ch-fixed"), &c.book, "Optics")
            .expect("first");
        let b = create_chapter(&f.conn, &f.teacher, Some("ch-fixed"), &c.book, "Optics")
            .expect("retry");
        assert_eq!(a, b);
        let tree = get_book_tree(&f.conn, &f.admin, &c.book, true).expect("tree");
        assert_eq!(tree.chapters.len(), 2);
    }

    #[test]
    fn delete_chapter_cascades_to_questions() {
        let f = Fixture::new();
        let c = f.chain();
        let q = tf(&f, &f.teacher, &c.topic, "Speed is scalar");
        let removed = delete_chapter(&f.conn, &f.teacher, &c.chapter).expect("delete");
        assert_eq!(
            removed,
            Removed {
                chapters: 1,
                topics: 1,
                questions: 1,
                comments: 0
            }
        );
        assert!(matches!(
            questions::get_question(&f.conn, &f.admin, &q.id),
            Err(StoreError::NotFound("question"))
        ));
    }

    #[test]
    fn reorder_requires_a_full_permutation() {
        let f = Fixture::new();
        let c = f.chain();
        let b = create_chapter(&f.conn, &f.teacher, None, &c.book, "Forces").expect("b");
        let partial = reorder_chapters(&f.conn, &f.teacher, &c.book, &[b.id.clone()]);
        assert!(matches!(partial, Err(StoreError::ValidationFailed(_))));

        let reordered =
            reorder_chapters(&f.conn, &f.teacher, &c.book, &[b.id.clone(), c.chapter.clone()])
                .expect("reorder");
        assert_eq!(reordered[0].id, b.id);
        assert_eq!(reordered[0].order, 1);
        assert_eq!(reordered[1].id, c.chapter);
        assert_eq!(reordered[1].order, 2);
    }

    #[test]
    fn out_of_scope_teacher_is_forbidden() {
        let f = Fixture::new();
        let c = f.chain();
        let outsider = f.another_teacher("arts@school.test");
        let arts = f.department("Arts");
        f.assign_to(
            &outsider,
            &[Assignment {
                department_id: arts,
                grade_id: None,
                subject_id: None,
            }],
        );

        let res = create_chapter(&f.conn, &outsider, None, &c.book, "Sneaky");
        assert!(matches!(res, Err(StoreError::Forbidden(_))));
        let res = get_book_tree(&f.conn, &outsider, &c.book, false);
        assert!(matches!(res, Err(StoreError::Forbidden(_))));
        let res = create_book(&f.conn, &outsider, None, &c.department, &c.grade, "Mine");
        assert!(matches!(res, Err(StoreError::Forbidden(_))));
    }

    #[test]
    fn delete_book_is_admin_only() {
        let f = Fixture::new();
        let c = f.chain();
        tf(&f, &f.teacher, &c.topic, "Speed is scalar");
        assert!(matches!(
            delete_book(&f.conn, &f.teacher, &c.book),
            Err(StoreError::Forbidden(_))
        ));
        let removed = delete_book(&f.conn, &f.admin, &c.book).expect("delete");
        assert_eq!(removed.questions, 1);
        assert!(matches!(
            get_book(&f.conn, &c.book),
            Err(StoreError::NotFound("book"))
        ));
    }
}
