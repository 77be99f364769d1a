//! Assignment resolver: which departments, grades and subjects a teacher may
//! act on. Every teacher-facing store operation goes through the checks here.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Identity, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub departments: BTreeSet<String>,
    pub grades_by_department: BTreeMap<String, BTreeSet<String>>,
    pub subjects_by_grade: BTreeMap<String, BTreeSet<String>>,
}

impl Scope {
    pub fn allows_department(&self, department_id: &str) -> bool {
        self.departments.contains(department_id)
    }

    pub fn allows_grade(&self, department_id: &str, grade_id: &str) -> bool {
        self.grades_by_department
            .get(department_id)
            .is_some_and(|g| g.contains(grade_id))
    }

    pub fn allows_subject(&self, grade_id: &str, subject_id: &str) -> bool {
        self.subjects_by_grade
            .get(grade_id)
            .is_some_and(|s| s.contains(subject_id))
    }

    fn add_grade(&mut self, department_id: &str, grade_id: &str) {
        self.departments.insert(department_id.to_string());
        self.grades_by_department
            .entry(department_id.to_string())
            .or_default()
            .insert(grade_id.to_string());
    }

    fn add_subject(&mut self, department_id: &str, grade_id: &str, subject_id: &str) {
        self.add_grade(department_id, grade_id);
        self.subjects_by_grade
            .entry(grade_id.to_string())
            .or_default()
            .insert(subject_id.to_string());
    }
}

/// One row of a teacher's assignment list. A missing grade means the whole
/// department; a missing subject means the whole grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub department_id: String,
    #[serde(default)]
    pub grade_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
}

fn ids(conn: &Connection, sql: &str, parent: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let out = stmt
        .query_map([parent], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(out)
}

fn teacher_role(conn: &Connection, teacher_id: &str) -> StoreResult<Role> {
    conn.query_row("SELECT role FROM users WHERE id = ?", [teacher_id], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or(StoreError::NotFound("teacher"))
}

pub fn list_assignments(conn: &Connection, teacher_id: &str) -> StoreResult<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT department_id, grade_id, subject_id
         FROM teacher_assignments
         WHERE teacher_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(Assignment {
                department_id: r.get(0)?,
                grade_id: r.get(1)?,
                subject_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Resolves a teacher's assignments against the current taxonomy.
pub fn get_scope(conn: &Connection, teacher_id: &str) -> StoreResult<Scope> {
    let mut scope = Scope::default();
    for a in list_assignments(conn, teacher_id)? {
        match (a.grade_id.as_deref(), a.subject_id.as_deref()) {
            (Some(grade_id), Some(subject_id)) => {
                scope.add_subject(&a.department_id, grade_id, subject_id);
            }
            (Some(grade_id), None) => {
                scope.add_grade(&a.department_id, grade_id);
                for s in ids(conn, "SELECT id FROM subjects WHERE grade_id = ?", grade_id)? {
                    scope.add_subject(&a.department_id, grade_id, &s);
                }
            }
            (None, _) => {
                scope.departments.insert(a.department_id.clone());
                for g in ids(
                    conn,
                    "SELECT id FROM grades WHERE department_id = ?",
                    &a.department_id,
                )? {
                    scope.add_grade(&a.department_id, &g);
                    for s in ids(conn, "SELECT id FROM subjects WHERE grade_id = ?", &g)? {
                        scope.add_subject(&a.department_id, &g, &s);
                    }
                }
            }
        }
    }
    Ok(scope)
}

/// `None` means the actor is an administrator and unrestricted.
pub fn scope_for(conn: &Connection, actor: &Identity) -> StoreResult<Option<Scope>> {
    if actor.is_admin() {
        return Ok(None);
    }
    get_scope(conn, &actor.uid).map(Some)
}

pub fn require_admin(actor: &Identity, action: &str) -> StoreResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(StoreError::forbidden(format!(
            "only administrators can {action}"
        )))
    }
}

pub fn require_department(
    conn: &Connection,
    actor: &Identity,
    department_id: &str,
) -> StoreResult<()> {
    match scope_for(conn, actor)? {
        Some(scope) if !scope.allows_department(department_id) => Err(StoreError::forbidden(
            "department is outside your assignments",
        )),
        _ => Ok(()),
    }
}

pub fn require_grade(
    conn: &Connection,
    actor: &Identity,
    department_id: &str,
    grade_id: &str,
) -> StoreResult<()> {
    match scope_for(conn, actor)? {
        Some(scope) if !scope.allows_department(department_id) => Err(StoreError::forbidden(
            "department is outside your assignments",
        )),
        Some(scope) if !scope.allows_grade(department_id, grade_id) => Err(
            StoreError::forbidden("grade is outside your assignments"),
        ),
        _ => Ok(()),
    }
}

fn validate_assignment(conn: &Connection, a: &Assignment) -> StoreResult<()> {
    let dept: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM departments WHERE id = ?",
            [&a.department_id],
            |r| r.get(0),
        )
        .optional()?;
    if dept.is_none() {
        return Err(StoreError::NotFound("department"));
    }
    if let Some(grade_id) = &a.grade_id {
        let grade: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM grades WHERE id = ? AND department_id = ?",
                (grade_id, &a.department_id),
                |r| r.get(0),
            )
            .optional()?;
        if grade.is_none() {
            return Err(StoreError::NotFound("grade"));
        }
    }
    if let Some(subject_id) = &a.subject_id {
        let Some(grade_id) = &a.grade_id else {
            return Err(StoreError::validation("a subject assignment needs its gradeId"));
        };
        let subject: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ? AND grade_id = ?",
                (subject_id, grade_id),
                |r| r.get(0),
            )
            .optional()?;
        if subject.is_none() {
            return Err(StoreError::NotFound("subject"));
        }
    }
    Ok(())
}

/// Replaces a teacher's assignments in one transaction.
pub fn set_assignments(
    conn: &Connection,
    actor: &Identity,
    teacher_id: &str,
    assignments: &[Assignment],
) -> StoreResult<Scope> {
    require_admin(actor, "assign teachers")?;
    if teacher_role(conn, teacher_id)? != Role::Teacher {
        return Err(StoreError::validation("assignments apply to teachers only"));
    }
    for a in assignments {
        validate_assignment(conn, a)?;
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM teacher_assignments WHERE teacher_id = ?",
        [teacher_id],
    )?;
    for a in assignments {
        tx.execute(
            "INSERT INTO teacher_assignments(id, teacher_id, department_id, grade_id, subject_id)
             VALUES(?, ?, ?, ?, ?)",
            (
                db::new_id(None),
                teacher_id,
                &a.department_id,
                &a.grade_id,
                &a.subject_id,
            ),
        )?;
    }
    tx.commit()?;
    tracing::info!(
        teacher_id = %teacher_id,
        count = assignments.len(),
        "teacher assignments replaced"
    );

    get_scope(conn, teacher_id)
}
