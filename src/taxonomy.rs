//! Departments, grades and subjects.
//!
//! Names are resolved to ids here and nowhere else. Uniqueness is
//! case-insensitive within the parent scope.

use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Department, Grade, Identity, Subject};
use crate::scope;

fn required_name(name: &str, entity: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation(format!(
            "{entity} name must not be empty"
        )));
    }
    Ok(name.to_string())
}

pub fn get_department(conn: &Connection, id: &str) -> StoreResult<Department> {
    conn.query_row(
        "SELECT id, name FROM departments WHERE id = ?",
        [id],
        |r| {
            Ok(Department {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::NotFound("department"))
}

pub fn get_grade(conn: &Connection, id: &str) -> StoreResult<Grade> {
    conn.query_row(
        "SELECT id, name, department_id FROM grades WHERE id = ?",
        [id],
        |r| {
            Ok(Grade {
                id: r.get(0)?,
                name: r.get(1)?,
                department_id: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::NotFound("grade"))
}

/// Checks that `grade_id` exists and belongs to `department_id`.
pub fn require_grade_in_department(
    conn: &Connection,
    department_id: &str,
    grade_id: &str,
) -> StoreResult<Grade> {
    get_department(conn, department_id)?;
    let grade = get_grade(conn, grade_id)?;
    if grade.department_id != department_id {
        return Err(StoreError::NotFound("grade"));
    }
    Ok(grade)
}

/// Fails when a client id already names another row of `table`.
fn require_unused_id(
    conn: &Connection,
    table: &str,
    entity: &str,
    client_id: Option<&str>,
) -> StoreResult<()> {
    match client_id {
        Some(id) if db::id_exists(conn, table, id)? => Err(StoreError::validation(format!(
            "id is already used by another {entity}"
        ))),
        _ => Ok(()),
    }
}

pub fn create_department(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    name: &str,
) -> StoreResult<Department> {
    scope::require_admin(actor, "create departments")?;
    let name = required_name(name, "department")?;
    let key = db::name_key(&name);

    let tx = conn.unchecked_transaction()?;
    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT id, name FROM departments WHERE name_key = ?",
            [&key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((existing_id, existing)) = existing {
        if client_id == Some(existing_id.as_str()) {
            return Ok(Department {
                id: existing_id,
                name: existing,
            });
        }
        return Err(StoreError::DuplicateName {
            entity: "department",
            name: existing,
        });
    }
    require_unused_id(&tx, "departments", "department", client_id)?;
    let id = db::new_id(client_id);
    tx.execute(
        "INSERT INTO departments(id, name, name_key) VALUES(?, ?, ?)",
        (&id, &name, &key),
    )?;
    tx.commit()?;
    tracing::info!(department_id = %id, name = %name, "department created");

    Ok(Department { id, name })
}

pub fn create_grade(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    department_id: &str,
    name: &str,
) -> StoreResult<Grade> {
    scope::require_admin(actor, "create grades")?;
    let name = required_name(name, "grade")?;
    get_department(conn, department_id)?;
    let key = db::name_key(&name);

    let tx = conn.unchecked_transaction()?;
    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT id, name FROM grades WHERE department_id = ? AND name_key = ?",
            (department_id, &key),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((existing_id, existing)) = existing {
        if client_id == Some(existing_id.as_str()) {
            return Ok(Grade {
                id: existing_id,
                name: existing,
                department_id: department_id.to_string(),
            });
        }
        return Err(StoreError::DuplicateName {
            entity: "grade",
            name: existing,
        });
    }
    require_unused_id(&tx, "grades", "grade", client_id)?;
    let id = db::new_id(client_id);
    tx.execute(
        "INSERT INTO grades(id, department_id, name, name_key) VALUES(?, ?, ?, ?)",
        (&id, department_id, &name, &key),
    )?;
    tx.commit()?;
    tracing::info!(grade_id = %id, department_id = %department_id, "grade created");

    Ok(Grade {
        id,
        name,
        department_id: department_id.to_string(),
    })
}

pub fn create_subject(
    conn: &Connection,
    actor: &Identity,
    client_id: Option<&str>,
    department_id: &str,
    grade_id: &str,
    name: &str,
) -> StoreResult<Subject> {
    scope::require_admin(actor, "create subjects")?;
    let name = required_name(name, "subject")?;
    require_grade_in_department(conn, department_id, grade_id)?;
    let key = db::name_key(&name);

    let tx = conn.unchecked_transaction()?;
    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT id, name FROM subjects WHERE grade_id = ? AND name_key = ?",
            (grade_id, &key),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((existing_id, existing)) = existing {
        if client_id == Some(existing_id.as_str()) {
            return Ok(Subject {
                id: existing_id,
                name: existing,
                department_id: department_id.to_string(),
                grade_id: grade_id.to_string(),
            });
        }
        return Err(StoreError::DuplicateName {
            entity: "subject",
            name: existing,
        });
    }
    require_unused_id(&tx, "subjects", "subject", client_id)?;
    let id = db::new_id(client_id);
    tx.execute(
        "INSERT INTO subjects(id, department_id, grade_id, name, name_key) VALUES(?, ?, ?, ?, ?)",
        (&id, department_id, grade_id, &name, &key),
    )?;
    tx.commit()?;
    tracing::info!(subject_id = %id, grade_id = %grade_id, "subject created");

    Ok(Subject {
        id,
        name,
        department_id: department_id.to_string(),
        grade_id: grade_id.to_string(),
    })
}

pub fn list_departments(conn: &Connection, actor: &Identity) -> StoreResult<Vec<Department>> {
    let scope = scope::scope_for(conn, actor)?;
    let mut stmt = conn.prepare("SELECT id, name FROM departments ORDER BY name_key, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Department {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|d| scope.as_ref().map_or(true, |s| s.allows_department(&d.id)))
        .collect())
}

pub fn list_grades(
    conn: &Connection,
    actor: &Identity,
    department_id: &str,
) -> StoreResult<Vec<Grade>> {
    get_department(conn, department_id)?;
    scope::require_department(conn, actor, department_id)?;
    let scope = scope::scope_for(conn, actor)?;

    let mut stmt = conn.prepare(
        "SELECT id, name, department_id FROM grades WHERE department_id = ? ORDER BY name_key, id",
    )?;
    let rows = stmt
        .query_map([department_id], |r| {
            Ok(Grade {
                id: r.get(0)?,
                name: r.get(1)?,
                department_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|g| {
            scope
                .as_ref()
                .map_or(true, |s| s.allows_grade(department_id, &g.id))
        })
        .collect())
}

pub fn list_subjects(
    conn: &Connection,
    actor: &Identity,
    department_id: &str,
    grade_id: &str,
) -> StoreResult<Vec<Subject>> {
    require_grade_in_department(conn, department_id, grade_id)?;
    scope::require_grade(conn, actor, department_id, grade_id)?;
    let scope = scope::scope_for(conn, actor)?;

    let mut stmt = conn.prepare(
        "SELECT id, name, department_id, grade_id
         FROM subjects
         WHERE department_id = ? AND grade_id = ?
         ORDER BY name_key, id",
    )?;
    let rows = stmt
        .query_map((department_id, grade_id), |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                department_id: r.get(2)?,
                grade_id: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|s| {
            scope
                .as_ref()
                .map_or(true, |sc| sc.allows_subject(grade_id, &s.id))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Assignment;
    use crate::testutil::Fixture;

    #[test]
    fn department_names_are_unique_ignoring_case() {
        let f = Fixture::new();
        create_department(&f.conn, &f.admin, None, "Science").expect("create");
        let dup = create_department(&f.conn, &f.admin, None, "  sCIENCE ");
        match dup {
            Err(StoreError::DuplicateName { entity, name }) => {
                assert_eq!(entity, "department");
                assert_eq!(name, "Science");
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
        let empty = create_department(&f.conn, &f.admin, None, "   ");
        assert!(matches!(empty, Err(StoreError::ValidationFailed(_))));
    }

    #[test]
    fn grade_names_are_scoped_to_their_department() {
        let f = Fixture::new();
        let science = f.department("Science");
        let arts = f.department("Arts");
        create_grade(&f.conn, &f.admin, None, &science, "Grade 5").expect("science g5");
        create_grade(&f.conn, &f.admin, None, &arts, "Grade 5").expect("arts g5");
        let dup = create_grade(&f.conn, &f.admin, None, &science, "grade 5");
        assert!(matches!(dup, Err(StoreError::DuplicateName { .. })));
        let orphan = create_grade(&f.conn, &f.admin, None, "missing", "Grade 1");
        assert!(matches!(orphan, Err(StoreError::NotFound("department"))));
    }

    #[test]
    fn subject_grade_must_belong_to_department() {
        let f = Fixture::new();
        let science = f.department("Science");
        let arts = f.department("Arts");
        let g5 = f.grade(&science, "Grade 5");
        let res = create_subject(&f.conn, &f.admin, None, &arts, &g5, "Painting");
        assert!(matches!(res, Err(StoreError::NotFound("grade"))));
        let ok = create_subject(&f.conn, &f.admin, None, &science, &g5, "Physics")
            .expect("subject");
        assert_eq!(ok.grade_id, g5);
    }

    #[test]
    fn lists_are_sorted_by_name_and_filtered_by_scope() {
        let f = Fixture::new();
        let science = f.department("science");
        let arts = f.department("Arts");
        let g6 = f.grade(&science, "Grade 6");
        let g5 = f.grade(&science, "grade 5");
        f.subject(&science, &g5, "Physics");
        f.subject(&science, &g5, "chemistry");

        let names: Vec<String> = list_departments(&f.conn, &f.admin)
            .expect("list")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Arts", "science"]);

        let grades: Vec<String> = list_grades(&f.conn, &f.admin, &science)
            .expect("grades")
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(grades, vec![g5.clone(), g6.clone()]);

        let subjects: Vec<String> = list_subjects(&f.conn, &f.admin, &science, &g5)
            .expect("subjects")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(subjects, vec!["chemistry", "Physics"]);

        f.assign(&[Assignment {
            department_id: science.clone(),
            grade_id: Some(g5.clone()),
            subject_id: None,
        }]);
        let visible = list_departments(&f.conn, &f.teacher).expect("teacher list");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, science);
        let grades = list_grades(&f.conn, &f.teacher, &science).expect("teacher grades");
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].id, g5);
        assert!(matches!(
            list_grades(&f.conn, &f.teacher, &arts),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            list_subjects(&f.conn, &f.teacher, &science, &g6),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn retry_with_same_id_returns_the_stored_department() {
        let f = Fixture::new();
        let a = create_department(&f.conn, &f.admin, Some("dep-1"), "Science").expect("create");
        let b = create_department(&f.conn, &f.admin, Some("dep-1"), "science").expect("retry");
        assert_eq!(a, b);
        assert_eq!(a.id, "dep-1");
        let other = create_department(&f.conn, &f.admin, Some("dep-2"), "Science");
        assert!(matches!(other, Err(StoreError::DuplicateName { .. })));
    }

    #[test]
    fn reused_id_for_a_different_record_is_a_validation_failure() {
        let f = Fixture::new();
        let maths = create_department(&f.conn, &f.admin, Some("dept-1"), "Maths").expect("maths");
        let arts = create_department(&f.conn, &f.admin, Some("dept-1"), "Arts");
        assert!(matches!(arts, Err(StoreError::ValidationFailed(_))));

        create_grade(&f.conn, &f.admin, Some("grade-1"), &maths.id, "Grade 1").expect("grade");
        let clash = create_grade(&f.conn, &f.admin, Some("grade-1"), &maths.id, "Grade 2");
        assert!(matches!(clash, Err(StoreError::ValidationFailed(_))));

        create_subject(&f.conn, &f.admin, Some("subj-1"), &maths.id, "grade-1", "Algebra")
            .expect("subject");
        let clash = create_subject(&f.conn, &f.admin, Some("subj-1"), &maths.id, "grade-1", "Geometry");
        assert!(matches!(clash, Err(StoreError::ValidationFailed(_))));

        let names: Vec<String> = list_departments(&f.conn, &f.admin)
            .expect("list")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Maths"]);
    }

    #[test]
    fn teachers_cannot_write_taxonomy() {
        let f = Fixture::new();
        let res = create_department(&f.conn, &f.teacher, None, "Science");
        assert!(matches!(res, Err(StoreError::Forbidden(_))));
    }
}
