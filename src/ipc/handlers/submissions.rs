use crate::db::{self, AssignmentRow, SubmissionRow};
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, opt_f64, opt_i64, opt_str, pass_threshold, require_actor, require_conn,
    require_course_manager, require_role, str_param, to_json,
};
use crate::ipc::types::{Actor, AppState, Request, Role};
use crate::shape::{self, GradeRelations, SubmissionRelations, SubmissionView};
use crate::submission::{self, HandIn};
use rusqlite::Connection;
use serde_json::json;

fn load_assignment(conn: &Connection, assignment_id: &str) -> LmsResult<AssignmentRow> {
    let assignment =
        db::assignment_get(conn, assignment_id)?.ok_or(LmsError::NotFound("assignment"))?;
    // Assignments of soft-deleted courses are gone too.
    load_course(conn, &assignment.course_id)?;
    Ok(assignment)
}

fn load_submission(conn: &Connection, submission_id: &str) -> LmsResult<SubmissionRow> {
    db::submission_get(conn, submission_id)?.ok_or(LmsError::NotFound("submission"))
}

fn require_manager_of(conn: &Connection, actor: &Actor, assignment: &AssignmentRow) -> LmsResult<()> {
    let course = load_course(conn, &assignment.course_id)?;
    require_course_manager(actor, &course)
}

/// Student-facing: the assignment is embedded.
fn for_student(conn: &Connection, row: &SubmissionRow) -> LmsResult<SubmissionView> {
    let assignment = db::assignment_get(conn, &row.assignment_id)?.map(|a| shape::assignment_view(&a));
    Ok(shape::submission_view(
        row,
        SubmissionRelations {
            assignment,
            ..SubmissionRelations::default()
        },
    ))
}

/// Staff-facing: student and grader are embedded, plus the assignment for percentages.
fn for_staff(conn: &Connection, row: &SubmissionRow, assignment: &AssignmentRow) -> LmsResult<SubmissionView> {
    let student = db::user_get(conn, &row.student_id)?.map(|u| shape::user_view(&u));
    let grader = match row.graded_by.as_deref() {
        Some(id) => db::user_get(conn, id)?.map(|u| shape::user_view(&u)),
        None => None,
    };
    Ok(shape::submission_view(
        row,
        SubmissionRelations {
            assignment: Some(shape::assignment_view(assignment)),
            student,
            grader,
        },
    ))
}

fn handle_assignments_submit(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_role(actor, &[Role::Student])?;
    let assignment = load_assignment(conn, &str_param(&req.params, "assignmentId")?)?;

    let hand_in = HandIn {
        content: opt_str(&req.params, "content"),
        file_url: opt_str(&req.params, "fileUrl"),
        file_name: opt_str(&req.params, "fileName"),
        file_size: opt_i64(&req.params, "fileSize")?,
        link_url: opt_str(&req.params, "linkUrl"),
    };
    let row = submission::submit(conn, &assignment, &actor.user_id, &hand_in)?;
    Ok(json!({ "submission": to_json(&for_student(conn, &row)?)? }))
}

/// Latest attempt for one assignment.
fn handle_assignments_my_submission(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_role(actor, &[Role::Student])?;
    let assignment = load_assignment(conn, &str_param(&req.params, "assignmentId")?)?;

    let latest = db::submissions_for_student(conn, &actor.user_id, Some(&assignment.id))?
        .into_iter()
        .max_by_key(|s| s.attempt_number)
        .ok_or(LmsError::NotFound("submission"))?;
    Ok(json!({ "submission": to_json(&for_student(conn, &latest)?)? }))
}

fn handle_submissions_mine(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_role(actor, &[Role::Student])?;
    let assignment_id = opt_str(&req.params, "assignmentId");

    let mut views = Vec::new();
    for row in db::submissions_for_student(conn, &actor.user_id, assignment_id.as_deref())? {
        let assignment = db::assignment_get(conn, &row.assignment_id)?;
        let visible = match assignment.as_ref() {
            Some(a) => db::course_get(conn, &a.course_id)?.is_some(),
            None => false,
        };
        if visible {
            views.push(for_student(conn, &row)?);
        }
    }
    Ok(json!({ "submissions": to_json(&views)? }))
}

fn handle_submissions_by_assignment(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let assignment = load_assignment(conn, &str_param(&req.params, "assignmentId")?)?;
    require_manager_of(conn, actor, &assignment)?;

    let views = db::submissions_for_assignment(conn, &assignment.id)?
        .iter()
        .map(|row| for_staff(conn, row, &assignment))
        .collect::<LmsResult<Vec<_>>>()?;
    Ok(json!({
        "assignment": to_json(&shape::assignment_view(&assignment))?,
        "submissions": to_json(&views)?,
    }))
}

fn handle_submissions_grade(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let submission_id = str_param(&req.params, "submissionId")?;
    let current = load_submission(conn, &submission_id)?;
    let assignment = load_assignment(conn, &current.assignment_id)?;
    require_manager_of(conn, actor, &assignment)?;

    let points = opt_f64(&req.params, "grade")?
        .ok_or_else(|| LmsError::bad_params("missing grade"))?;
    let (row, grade_id) = submission::grade(conn, &submission_id, points, &actor.user_id)?;

    let grade_row = db::grade_get(conn, &grade_id)?.ok_or(LmsError::NotFound("grade"))?;
    let grade = shape::grade_view(&grade_row, pass_threshold(conn)?, GradeRelations::default());
    Ok(json!({
        "submission": to_json(&for_staff(conn, &row, &assignment)?)?,
        "grade": to_json(&grade)?,
    }))
}

fn handle_submissions_feedback(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let submission_id = str_param(&req.params, "submissionId")?;
    let current = load_submission(conn, &submission_id)?;
    let assignment = load_assignment(conn, &current.assignment_id)?;
    require_manager_of(conn, actor, &assignment)?;

    let feedback = str_param(&req.params, "feedback")?;
    let notes = opt_str(&req.params, "instructorNotes");
    let row = submission::feedback(conn, &submission_id, &feedback, notes.as_deref())?;
    Ok(json!({ "submission": to_json(&for_staff(conn, &row, &assignment)?)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.submit" => handle_assignments_submit(state, req),
        "assignments.mySubmission" => handle_assignments_my_submission(state, req),
        "submissions.mine" => handle_submissions_mine(state, req),
        "submissions.byAssignment" => handle_submissions_by_assignment(state, req),
        "submissions.grade" => handle_submissions_grade(state, req),
        "submissions.feedback" => handle_submissions_feedback(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
