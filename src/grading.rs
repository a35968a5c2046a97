//! Writes to the `grades` table.
//!
//! A grade tied to an assignment is unique per (student, assignment): grading it
//! again replaces the row instead of adding a second one. Grades without an
//! assignment are free-standing entries and accumulate.

use crate::db;
use crate::enrollment::EnrollmentStatus;
use crate::error::{LmsError, LmsResult};
use rusqlite::Connection;
use uuid::Uuid;

pub struct GradeEntry<'a> {
    pub student_id: &'a str,
    pub course_id: &'a str,
    pub assignment_id: Option<&'a str>,
    pub grade: f64,
    pub letter: &'a str,
    pub comments: Option<&'a str>,
}

/// Only enrolled or completed students carry grades.
pub fn require_gradable(conn: &Connection, student_id: &str, course_id: &str) -> LmsResult<()> {
    let standing = db::enrollment_for_pair(conn, student_id, course_id)?
        .and_then(|e| EnrollmentStatus::parse(&e.status));
    match standing {
        Some(EnrollmentStatus::Enrolled) | Some(EnrollmentStatus::Completed) => Ok(()),
        _ => Err(LmsError::Conflict(
            "student is not enrolled in this course".to_string(),
        )),
    }
}

/// Returns the id of the row written. Lookup and write are two statements; callers
/// run them inside their transaction.
pub fn record(conn: &Connection, entry: &GradeEntry<'_>) -> LmsResult<String> {
    let now = db::now_rfc3339();
    let existing = match entry.assignment_id {
        Some(assignment_id) => db::grade_for_assignment(conn, entry.student_id, assignment_id)?,
        None => None,
    };

    let id = match existing {
        Some(row) => {
            conn.execute(
                "UPDATE grades SET
                    grade = ?1,
                    grade_letter = ?2,
                    comments = COALESCE(?3, comments),
                    updated_at = ?4
                 WHERE id = ?5",
                (entry.grade, entry.letter, entry.comments, &now, &row.id),
            )?;
            tracing::info!(
                grade_id = %row.id,
                student_id = entry.student_id,
                previous = row.grade,
                grade = entry.grade,
                "grade replaced"
            );
            row.id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO grades(
                    id, user_id, course_id, assignment_id, grade, grade_letter, comments,
                    created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    entry.student_id,
                    entry.course_id,
                    entry.assignment_id,
                    entry.grade,
                    entry.letter,
                    entry.comments,
                    &now,
                    &now,
                ),
            )?;
            tracing::info!(
                grade_id = %id,
                student_id = entry.student_id,
                course_id = entry.course_id,
                grade = entry.grade,
                "grade recorded"
            );
            id
        }
    };
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
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

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO users(id, name, email, role, created_at, updated_at)
               VALUES('s-1', 'Student', 's1@example.edu', 'student', 't', 't');
             INSERT INTO courses(id, code, name, created_at, updated_at)
               VALUES('c-1', 'SRF101', 'Sharaf', 't', 't');
             INSERT INTO assignments(id, course_id, title, created_at)
               VALUES('a-1', 'c-1', 'Tasrif table', 't');
             INSERT INTO course_enrollments(id, course_id, student_id, status, created_at, updated_at)
               VALUES('e-1', 'c-1', 's-1', 'enrolled', 't', 't');",
        )
        .expect("seed");
    }

    fn entry<'a>(assignment_id: Option<&'a str>, grade: f64, letter: &'a str) -> GradeEntry<'a> {
        GradeEntry {
            student_id: "s-1",
            course_id: "c-1",
            assignment_id,
            grade,
            letter,
            comments: None,
        }
    }

    #[test]
    fn regrading_an_assignment_replaces_the_row() {
        let ws = temp_dir("lmsd-grading-regrade");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);

        let first = record(&conn, &entry(Some("a-1"), 50.0, "F")).expect("first");
        let second = record(&conn, &entry(Some("a-1"), 90.0, "A")).expect("second");
        assert_eq!(first, second);
        assert_eq!(
            db::grade_values_for_pair(&conn, "s-1", "c-1").expect("values"),
            vec![90.0]
        );
        let row = db::grade_get(&conn, &first).expect("query").expect("row");
        assert_eq!(row.grade_letter.as_deref(), Some("A"));
    }

    #[test]
    fn free_standing_grades_accumulate() {
        let ws = temp_dir("lmsd-grading-free");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);

        record(&conn, &entry(None, 70.0, "C")).expect("first");
        record(&conn, &entry(None, 80.0, "B")).expect("second");
        assert_eq!(
            db::grade_values_for_pair(&conn, "s-1", "c-1").expect("values").len(),
            2
        );
    }

    #[test]
    fn pending_students_are_not_gradable() {
        let ws = temp_dir("lmsd-grading-pending");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);
        require_gradable(&conn, "s-1", "c-1").expect("enrolled");

        conn.execute("UPDATE course_enrollments SET status = 'pending'", [])
            .expect("reset");
        let err = require_gradable(&conn, "s-1", "c-1").expect_err("pending");
        assert_eq!(err.code(), "conflict");
    }
}
