//! Assignment hand-ins.
//!
//! Each hand-in is a new attempt (`attempt_number` counts up per student and
//! assignment). Grading an attempt also writes the student's grade row for the
//! assignment, scaled to 0-100 against `max_points`, so the course aggregate
//! always reflects the latest graded attempt.

use crate::calc::{self, LetterPolicy};
use crate::db::{self, AssignmentRow, SubmissionRow};
use crate::enrollment::EnrollmentStatus;
use crate::error::{LmsError, LmsResult};
use crate::grading::{self, GradeEntry};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct HandIn {
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub link_url: Option<String>,
}

/// Date-only due dates run to the end of that day (UTC). Unparseable dates never expire.
pub fn is_past_due(due_date: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(raw) = due_date.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return now > dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return now > dt.and_utc();
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return now.date_naive() > day;
    }
    false
}

fn load(conn: &Connection, submission_id: &str) -> LmsResult<SubmissionRow> {
    db::submission_get(conn, submission_id)?.ok_or(LmsError::NotFound("submission"))
}

pub fn submit(
    conn: &Connection,
    assignment: &AssignmentRow,
    student_id: &str,
    hand_in: &HandIn,
) -> LmsResult<SubmissionRow> {
    if hand_in.content.is_none() && hand_in.file_url.is_none() && hand_in.link_url.is_none() {
        return Err(LmsError::bad_params(
            "a submission needs content, fileUrl or linkUrl",
        ));
    }
    if hand_in.file_size.is_some_and(|s| s < 0) {
        return Err(LmsError::bad_params("fileSize must not be negative"));
    }
    let standing = db::enrollment_for_pair(conn, student_id, &assignment.course_id)?
        .and_then(|e| EnrollmentStatus::parse(&e.status));
    if standing != Some(EnrollmentStatus::Enrolled) {
        return Err(LmsError::Conflict(
            "only enrolled students can submit work".to_string(),
        ));
    }

    let now = Utc::now();
    let stamp = db::now_rfc3339();
    let is_late = is_past_due(assignment.due_date.as_deref(), now);
    let status = if is_late { "late" } else { "submitted" };
    let id = Uuid::new_v4().to_string();

    let tx = conn.unchecked_transaction()?;
    let attempt = db::submission_attempts(&tx, &assignment.id, student_id)? + 1;
    tx.execute(
        "INSERT INTO assignment_submissions(
            id, assignment_id, student_id, content, file_url, file_name, file_size, link_url,
            status, submitted_at, is_late, attempt_number, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &id,
            &assignment.id,
            student_id,
            &hand_in.content,
            &hand_in.file_url,
            &hand_in.file_name,
            hand_in.file_size,
            &hand_in.link_url,
            status,
            &stamp,
            is_late as i64,
            attempt,
            &stamp,
            &stamp,
        ],
    )?;
    tx.commit()?;
    tracing::info!(submission_id = %id, assignment_id = %assignment.id, student_id, attempt, is_late, "work submitted");
    load(conn, &id)
}

/// Scores the attempt and writes the matching grade row in one transaction.
pub fn grade(
    conn: &Connection,
    submission_id: &str,
    points: f64,
    grader_id: &str,
) -> LmsResult<(SubmissionRow, String)> {
    let sub = load(conn, submission_id)?;
    let assignment =
        db::assignment_get(conn, &sub.assignment_id)?.ok_or(LmsError::NotFound("assignment"))?;
    if !(0.0..=assignment.max_points).contains(&points) {
        return Err(LmsError::bad_params(format!(
            "grade must be between 0 and {}",
            assignment.max_points
        )));
    }
    grading::require_gradable(conn, &sub.student_id, &assignment.course_id)?;

    let scaled = calc::grade_percentage(points, assignment.max_points);
    let letter = LetterPolicy::Coarse.letter_for(scaled);
    let now = db::now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE assignment_submissions
         SET grade = ?1, graded_at = ?2, graded_by = ?3, status = 'graded', updated_at = ?2
         WHERE id = ?4",
        (points, &now, grader_id, submission_id),
    )?;
    let grade_id = grading::record(
        &tx,
        &GradeEntry {
            student_id: &sub.student_id,
            course_id: &assignment.course_id,
            assignment_id: Some(&assignment.id),
            grade: scaled,
            letter,
            comments: sub.feedback.as_deref(),
        },
    )?;
    tx.commit()?;
    tracing::info!(submission_id, grade_id = %grade_id, points, scaled, "submission graded");
    Ok((load(conn, submission_id)?, grade_id))
}

/// Feedback also becomes the comment on the grade row once the attempt is graded.
pub fn feedback(
    conn: &Connection,
    submission_id: &str,
    feedback: &str,
    instructor_notes: Option<&str>,
) -> LmsResult<SubmissionRow> {
    let sub = load(conn, submission_id)?;
    let now = db::now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE assignment_submissions
         SET feedback = ?1, instructor_notes = COALESCE(?2, instructor_notes), updated_at = ?3
         WHERE id = ?4",
        (feedback, instructor_notes, &now, submission_id),
    )?;
    if sub.grade.is_some() {
        tx.execute(
            "UPDATE grades SET comments = ?1, updated_at = ?2
             WHERE user_id = ?3 AND assignment_id = ?4",
            (feedback, &now, &sub.student_id, &sub.assignment_id),
        )?;
    }
    tx.commit()?;
    tracing::info!(submission_id, "feedback recorded");
    load(conn, submission_id)
}
