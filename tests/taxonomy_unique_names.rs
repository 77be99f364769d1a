use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_curriculumd");
        let mut child = Command::new(exe)
            .env_remove("CURRICULUMD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn curriculumd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            _child: child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts the call failed with `code` and returns the error object.
    fn request_err(&mut self, method: &str, params: Value, code: &str) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let error = value.get("error").cloned().unwrap_or_else(|| json!({}));
        assert_eq!(
            error.get("code").and_then(|v| v.as_str()),
            Some(code),
            "{} failed with the wrong code: {}",
            method,
            value
        );
        error
    }

    fn login(&mut self, email: &str, password: &str) -> Value {
        self.request_ok("auth.login", json!({ "email": email, "password": password }))
    }
}

fn str_of<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {key} in {v}"))
}

/// Opens a fresh workspace and signs in as its first administrator.
fn bootstrap(sc: &mut Sidecar, prefix: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    sc.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    sc.request_ok(
        "users.create",
        json!({
            "email": "admin@school.test",
            "password": "admin-password",
            "role": "admin",
            "displayName": "Admin"
        }),
    );
    sc.login("admin@school.test", "admin-password");
    workspace
}

fn add_teacher(sc: &mut Sidecar, email: &str) -> String {
    let user = sc.request_ok(
        "users.create",
        json!({ "email": email, "password": "teacher-password", "role": "teacher" }),
    );
    str_of(&user, "uid").to_string()
}

#[test]
fn department_names_are_unique_ignoring_case() {
    let mut sc = Sidecar::spawn();
    let workspace = bootstrap(&mut sc, "curriculumd-taxonomy-dup");

    sc.request_ok("departments.create", json!({ "name": "Science" }));
    let err = sc.request_err(
        "departments.create",
        json!({ "name": "  SCIENCE " }),
        "duplicate_name",
    );
    assert_eq!(err["details"]["entity"], json!("department"));
    assert_eq!(err["details"]["name"], json!("Science"));
    sc.request_err("departments.create", json!({ "name": "   " }), "validation_failed");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grades_and_subjects_are_scoped_and_sorted() {
    let mut sc = Sidecar::spawn();
    let workspace = bootstrap(&mut sc, "curriculumd-taxonomy-sorted");

    let science = sc.request_ok("departments.create", json!({ "name": "Science" }));
    let science = str_of(&science, "id").to_string();
    let arts = sc.request_ok("departments.create", json!({ "name": "arts" }));
    let arts = str_of(&arts, "id").to_string();

    let g6 = sc.request_ok("grades.create", json!({ "departmentId": science, "name": "Grade 6" }));
    let g6 = str_of(&g6, "id").to_string();
    let g5 = sc.request_ok("grades.create", json!({ "departmentId": science, "name": "Grade 5" }));
    let g5 = str_of(&g5, "id").to_string();
    sc.request_ok("grades.create", json!({ "departmentId": arts, "name": "grade 5" }));
    sc.request_err(
        "grades.create",
        json!({ "departmentId": science, "name": "GRADE 5" }),
        "duplicate_name",
    );
    sc.request_err(
        "grades.create",
        json!({ "departmentId": "missing", "name": "Grade 1" }),
        "not_found",
    );

    sc.request_ok(
        "subjects.create",
        json!({ "departmentId": science, "gradeId": g5, "name": "Physics" }),
    );
    sc.request_ok(
        "subjects.create",
        json!({ "departmentId": science, "gradeId": g5, "name": "biology" }),
    );
    sc.request_err(
        "subjects.create",
        json!({ "departmentId": arts, "gradeId": g5, "name": "Painting" }),
        "not_found",
    );

    let departments = sc.request_ok("departments.list", json!({}));
    let names: Vec<&str> = departments["departments"]
        .as_array()
        .expect("departments")
        .iter()
        .map(|d| str_of(d, "name"))
        .collect();
    assert_eq!(names, vec!["arts", "Science"]);

    let grades = sc.request_ok("grades.list", json!({ "departmentId": science }));
    let ids: Vec<&str> = grades["grades"]
        .as_array()
        .expect("grades")
        .iter()
        .map(|g| str_of(g, "id"))
        .collect();
    assert_eq!(ids, vec![g5.as_str(), g6.as_str()]);

    let subjects = sc.request_ok(
        "subjects.list",
        json!({ "departmentId": science, "gradeId": g5 }),
    );
    let names: Vec<&str> = subjects["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .map(|s| str_of(s, "name"))
        .collect();
    assert_eq!(names, vec!["biology", "Physics"]);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn client_id_reused_for_another_department_is_rejected() {
    let mut sc = Sidecar::spawn();
    let workspace = bootstrap(&mut sc, "curriculumd-taxonomy-reused-id");

    let maths = sc.request_ok("departments.create", json!({ "id": "dept-1", "name": "Maths" }));
    assert_eq!(str_of(&maths, "id"), "dept-1");
    let replay = sc.request_ok("departments.create", json!({ "id": "dept-1", "name": "Maths" }));
    assert_eq!(replay, maths);

    let err = sc.request_err(
        "departments.create",
        json!({ "id": "dept-1", "name": "Arts" }),
        "validation_failed",
    );
    assert!(err.get("details").map_or(true, |d| d.get("retryable").is_none()));

    let departments = sc.request_ok("departments.list", json!({}));
    assert_eq!(departments["departments"].as_array().expect("departments").len(), 1);

    let _ = std::fs::remove_dir_all(workspace);
}
