#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQ: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lmsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lmsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");

    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

/// One request as `actor`, or anonymously when `actor` is `None`.
pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    actor: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(a) = actor {
        payload["actor"] = a;
    }
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    actor: Option<serde_json::Value>,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, actor);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Expects a failure and returns its error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    actor: Option<serde_json::Value>,
) -> String {
    let value = request(stdin, reader, id, method, params, actor);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn actor(user_id: &str, role: &str) -> Option<serde_json::Value> {
    Some(json!({ "userId": user_id, "role": role }))
}

pub fn admin() -> Option<serde_json::Value> {
    actor("admin-root", "management")
}

pub fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string at {} in {}", pointer, value))
}

/// Drives one sidecar against a fresh workspace, numbering request ids.
pub struct Session {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    pub workspace: PathBuf,
    next_id: u64,
}

impl Session {
    pub fn start(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            workspace,
            next_id: 0,
        };
        let path = s.workspace.to_string_lossy().to_string();
        s.ok("workspace.select", json!({ "path": path }), None);
        s
    }

    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        actor: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let id = self.id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params, actor)
    }

    pub fn err(
        &mut self,
        method: &str,
        params: serde_json::Value,
        actor: Option<serde_json::Value>,
    ) -> String {
        let id = self.id();
        request_err(&mut self.stdin, &mut self.reader, &id, method, params, actor)
    }

    pub fn user(&mut self, name: &str, role: &str) -> String {
        let email = format!("{}@example.edu", name.to_ascii_lowercase().replace(' ', "."));
        let res = self.ok(
            "users.create",
            json!({ "name": name, "email": email, "role": role }),
            admin(),
        );
        str_at(&res, "/user/id").to_string()
    }

    /// Course taught by `instructor_id`, created by an admin.
    pub fn course(&mut self, code: &str, instructor_id: &str, credits: i64, capacity: i64) -> String {
        let res = self.ok(
            "courses.create",
            json!({
                "code": code,
                "name": format!("Course {}", code),
                "instructorId": instructor_id,
                "creditHours": credits,
                "capacity": capacity,
                "semester": "Fall",
                "year": 2025,
            }),
            admin(),
        );
        str_at(&res, "/course/id").to_string()
    }

    /// Requests and approves an enrollment; returns its id.
    pub fn enroll(&mut self, student_id: &str, course_id: &str) -> String {
        let res = self.ok(
            "enrollments.request",
            json!({ "courseId": course_id }),
            actor(student_id, "student"),
        );
        let enrollment_id = str_at(&res, "/enrollment/id").to_string();
        self.ok(
            "enrollments.approve",
            json!({ "enrollmentId": enrollment_id }),
            admin(),
        );
        enrollment_id
    }

    pub fn grade(&mut self, student_id: &str, course_id: &str, grade: f64) -> serde_json::Value {
        self.ok(
            "grades.create",
            json!({ "studentId": student_id, "courseId": course_id, "grade": grade }),
            admin(),
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
