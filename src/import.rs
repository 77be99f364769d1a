//! Bulk question import from delimited text.
//!
//! Header row plus one question per data row. Columns are matched by header
//! name, case-insensitively and in any order:
//! `text, type, option1..option4, correctIndex, shortAnswer, blankAnswer,
//! trueFalseAnswer, shortAnswerSubtype`. Rows that do not make a complete
//! question of their type are dropped and counted.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::approval;
use crate::content;
use crate::db;
use crate::error::StoreResult;
use crate::model::{canonical_kind, Identity, QuestionBody};
use crate::questions;
use crate::settings::Policy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    pub line: usize,
    pub text: String,
    pub body: QuestionBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImport {
    pub rows: Vec<ParsedQuestion>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub dropped: usize,
    pub question_ids: Vec<String>,
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

fn parse_boolish(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "t" => Some(true),
        "0" | "false" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

fn header_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_header(line: &str) -> Self {
        let mut idx = HashMap::new();
        for (i, name) in parse_csv_record(line).iter().enumerate() {
            idx.entry(header_key(name)).or_insert(i);
        }
        Self(idx)
    }

    fn get<'a>(&self, fields: &'a [String], name: &str) -> &'a str {
        self.0
            .get(name)
            .and_then(|&i| fields.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

fn row_body(
    cols: &Columns,
    fields: &[String],
    policy: &Policy,
) -> Option<QuestionBody> {
    let body = match canonical_kind(cols.get(fields, "type"))? {
        "multipleChoice" => QuestionBody::MultipleChoice {
            options: [
                cols.get(fields, "option1").to_string(),
                cols.get(fields, "option2").to_string(),
                cols.get(fields, "option3").to_string(),
                cols.get(fields, "option4").to_string(),
            ],
            correct_index: cols.get(fields, "correctindex").parse().ok()?,
        },
        "shortAnswer" => QuestionBody::ShortAnswer {
            answer: cols.get(fields, "shortanswer").to_string(),
            subtype: match cols.get(fields, "shortanswersubtype") {
                "" => policy.default_subtype().to_string(),
                s => s.to_string(),
            },
        },
        "fillInBlank" => QuestionBody::FillInBlank {
            answer: cols.get(fields, "blankanswer").to_string(),
        },
        "trueFalse" => QuestionBody::TrueFalse {
            is_true: parse_boolish(cols.get(fields, "truefalseanswer"))?,
        },
        _ => return None,
    };
    body.validate(&policy.short_answer_subtypes).ok()?;
    Some(body)
}

/// Parses rows, keeping at most `policy.max_import_rows` valid questions.
pub fn parse_questions(text: &str, policy: &Policy) -> ParsedImport {
    let mut parsed = ParsedImport::default();
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header)) = lines.next() else {
        return parsed;
    };
    let cols = Columns::from_header(header.trim_start_matches('\u{feff}'));

    for (i, line) in lines {
        let fields = parse_csv_record(line);
        let text = cols.get(&fields, "text");
        let body = if text.is_empty() {
            None
        } else {
            row_body(&cols, &fields, policy)
        };
        match body {
            Some(body) if parsed.rows.len() < policy.max_import_rows => {
                parsed.rows.push(ParsedQuestion {
                    line: i + 1,
                    text: text.to_string(),
                    body,
                });
            }
            _ => parsed.dropped += 1,
        }
    }
    parsed
}

/// Parses and inserts a whole file under one topic in a single transaction.
pub fn import_questions(
    conn: &Connection,
    actor: &Identity,
    policy: &Policy,
    topic_id: &str,
    text: &str,
) -> StoreResult<ImportSummary> {
    let book = content::book_of_topic(conn, topic_id)?;
    content::require_book_access(conn, actor, &book)?;

    let parsed = parse_questions(text, policy);
    let status = approval::initial_status(actor.role, policy);

    let tx = conn.unchecked_transaction()?;
    let mut question_ids = Vec::with_capacity(parsed.rows.len());
    for row in parsed.rows {
        let q = questions::insert_question(
            &tx,
            actor,
            status,
            db::new_id(None),
            topic_id,
            row.text,
            row.body,
        )?;
        tracing::debug!(line = row.line, question_id = %q.id, "row imported");
        question_ids.push(q.id);
    }
    tx.commit()?;

    if parsed.dropped > 0 {
        tracing::warn!(topic_id = %topic_id, dropped = parsed.dropped, "import dropped rows");
    }
    tracing::info!(
        topic_id = %topic_id,
        imported = question_ids.len(),
        "questions imported"
    );

    Ok(ImportSummary {
        imported: question_ids.len(),
        dropped: parsed.dropped,
        question_ids,
    })
}
