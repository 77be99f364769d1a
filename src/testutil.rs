use rusqlite::Connection;

use crate::content;
use crate::db;
use crate::identity;
use crate::model::{Identity, Role};
use crate::scope::{self, Assignment};
use crate::settings::Policy;
use crate::taxonomy;

/// In-memory workspace with one administrator and one teacher.
pub struct Fixture {
    pub conn: Connection,
    pub admin: Identity,
    pub teacher: Identity,
}

/// Ids of a department/grade/book/chapter/topic chain.
pub struct Chain {
    pub department: String,
    pub grade: String,
    pub book: String,
    pub chapter: String,
    pub topic: String,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = db::open_memory();
        let admin = identity::create_user(
            &conn,
            None,
            "admin@school.test",
            "admin-password",
            Role::Admin,
            "Admin",
        )
        .expect("admin");
        let teacher = identity::create_user(
            &conn,
            Some(&admin),
            "teacher@school.test",
            "teacher-password",
            Role::Teacher,
            "Teacher",
        )
        .expect("teacher");
        Self {
            conn,
            admin,
            teacher,
        }
    }

    pub fn another_teacher(&self, email: &str) -> Identity {
        identity::create_user(
            &self.conn,
            Some(&self.admin),
            email,
            "teacher-password",
            Role::Teacher,
            "",
        )
        .expect("teacher")
    }

    pub fn policy(&self) -> Policy {
        Policy::load(&self.conn).expect("policy")
    }

    pub fn department(&self, name: &str) -> String {
        taxonomy::create_department(&self.conn, &self.admin, None, name)
            .expect("department")
            .id
    }

    pub fn grade(&self, department: &str, name: &str) -> String {
        taxonomy::create_grade(&self.conn, &self.admin, None, department, name)
            .expect("grade")
            .id
    }

    pub fn subject(&self, department: &str, grade: &str, name: &str) -> String {
        taxonomy::create_subject(&self.conn, &self.admin, None, department, grade, name)
            .expect("subject")
            .id
    }

    pub fn assign(&self, assignments: &[Assignment]) {
        self.assign_to(&self.teacher, assignments);
    }

    pub fn assign_to(&self, teacher: &Identity, assignments: &[Assignment]) {
        scope::set_assignments(&self.conn, &self.admin, &teacher.uid, assignments)
            .expect("assign");
    }

    /// Science / Grade 5 / Physics_101 / Motion / Velocity with the teacher
    /// assigned to Science, Grade 5.
    pub fn chain(&self) -> Chain {
        let department = self.department("Science");
        let grade = self.grade(&department, "Grade 5");
        self.assign(&[Assignment {
            department_id: department.clone(),
            grade_id: Some(grade.clone()),
            subject_id: None,
        }]);
        let book = content::create_book(
            &self.conn,
            &self.teacher,
            None,
            &department,
            &grade,
            "Physics_101",
        )
        .expect("book")
        .id;
        let chapter = content::create_chapter(&self.conn, &self.teacher, None, &book, "Motion")
            .expect("chapter")
            .id;
        let topic = content::create_topic(&self.conn, &self.teacher, None, &chapter, "Velocity")
            .expect("topic")
            .id;
        Chain {
            department,
            grade,
            book,
            chapter,
            topic,
        }
    }
}
