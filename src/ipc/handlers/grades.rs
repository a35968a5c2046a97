use std::collections::BTreeSet;

use crate::calc::{self, LetterPolicy};
use crate::db::{self, GradeFilter, GradeRow};
use crate::error::{LmsError, LmsResult};
use crate::grading::{self, GradeEntry};
use crate::ipc::error::respond;
use crate::ipc::handlers::courses::loaded_course_view;
use crate::ipc::helpers::{
    load_course, opt_f64, opt_str, pass_threshold, require_actor, require_conn,
    require_course_manager, require_role, str_param, student_id_param, to_json,
};
use crate::ipc::types::{AppState, Request, Role};
use crate::shape::{self, GradeRelations, GradeView};
use rusqlite::Connection;
use serde_json::json;

/// Which relations a listing embeds.
#[derive(Clone, Copy, Default)]
struct Embed {
    student: bool,
    course: bool,
    assignment: bool,
}

fn shape_grade(conn: &Connection, g: &GradeRow, threshold: f64, embed: Embed) -> LmsResult<GradeView> {
    let mut rel = GradeRelations::default();
    if embed.student {
        rel.student = db::user_get(conn, &g.user_id)?.map(|u| shape::user_view(&u));
    }
    if embed.course {
        rel.course = match db::course_get(conn, &g.course_id)? {
            Some(c) => Some(loaded_course_view(conn, &c)?),
            None => None,
        };
    }
    if embed.assignment {
        if let Some(id) = g.assignment_id.as_deref() {
            rel.assignment = db::assignment_get(conn, id)?.map(|a| shape::assignment_view(&a));
        }
    }
    Ok(shape::grade_view(g, threshold, rel))
}

fn shape_grades(conn: &Connection, rows: &[GradeRow], embed: Embed) -> LmsResult<Vec<GradeView>> {
    let threshold = pass_threshold(conn)?;
    rows.iter()
        .map(|g| shape_grade(conn, g, threshold, embed))
        .collect()
}

fn validate_score(grade: f64) -> LmsResult<f64> {
    if !(0.0..=100.0).contains(&grade) {
        return Err(LmsError::bad_params("grade must be between 0 and 100"));
    }
    Ok(grade)
}

/// A supplied letter must come from the coarse table; otherwise it is derived.
fn resolve_letter(supplied: Option<String>, grade: f64) -> LmsResult<String> {
    match supplied {
        Some(letter) => {
            let letter = letter.to_ascii_uppercase();
            if !LetterPolicy::Coarse.contains(&letter) {
                return Err(LmsError::bad_params(format!(
                    "gradeLetter must be one of {}",
                    LetterPolicy::Coarse.letters().join(", ")
                )));
            }
            Ok(letter)
        }
        None => Ok(LetterPolicy::Coarse.letter_for(grade).to_string()),
    }
}

fn load_grade(conn: &Connection, grade_id: &str) -> LmsResult<GradeRow> {
    db::grade_get(conn, grade_id)?.ok_or(LmsError::NotFound("grade"))
}

fn single_grade_json(conn: &Connection, grade_id: &str) -> LmsResult<serde_json::Value> {
    let row = load_grade(conn, grade_id)?;
    let embed = Embed {
        assignment: true,
        ..Embed::default()
    };
    let view = shape_grade(conn, &row, pass_threshold(conn)?, embed)?;
    Ok(json!({ "grade": to_json(&view)? }))
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let student_id = str_param(&req.params, "studentId")?;
    let grade = validate_score(
        opt_f64(&req.params, "grade")?.ok_or_else(|| LmsError::bad_params("missing grade"))?,
    )?;
    let letter = resolve_letter(opt_str(&req.params, "gradeLetter"), grade)?;
    let comments = opt_str(&req.params, "comments");

    grading::require_gradable(conn, &student_id, &course_id)?;

    let assignment_id = opt_str(&req.params, "assignmentId");
    if let Some(id) = assignment_id.as_deref() {
        let assignment = db::assignment_get(conn, id)?.ok_or(LmsError::NotFound("assignment"))?;
        if assignment.course_id != course_id {
            return Err(LmsError::bad_params(
                "assignment does not belong to this course",
            ));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let id = grading::record(
        &tx,
        &GradeEntry {
            student_id: &student_id,
            course_id: &course_id,
            assignment_id: assignment_id.as_deref(),
            grade,
            letter: &letter,
            comments: comments.as_deref(),
        },
    )?;
    tx.commit()?;
    single_grade_json(conn, &id)
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let grade_id = str_param(&req.params, "gradeId")?;
    let row = load_grade(conn, &grade_id)?;
    let course = load_course(conn, &row.course_id)?;
    require_course_manager(actor, &course)?;

    let new_grade = opt_f64(&req.params, "grade")?.map(validate_score).transpose()?;
    let supplied_letter = opt_str(&req.params, "gradeLetter");
    // A new score without a letter re-derives it; a letter alone is checked against the table.
    let letter = match (new_grade, supplied_letter) {
        (None, None) => None,
        (g, l) => Some(resolve_letter(l, g.unwrap_or(row.grade))?),
    };
    let comments = opt_str(&req.params, "comments");

    conn.execute(
        "UPDATE grades SET
            grade = COALESCE(?1, grade),
            grade_letter = COALESCE(?2, grade_letter),
            comments = COALESCE(?3, comments),
            updated_at = ?4
         WHERE id = ?5",
        (new_grade, &letter, &comments, db::now_rfc3339(), &grade_id),
    )?;
    tracing::info!(grade_id = %grade_id, "grade updated");
    single_grade_json(conn, &grade_id)
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let grade_id = str_param(&req.params, "gradeId")?;
    let row = load_grade(conn, &grade_id)?;
    let course = load_course(conn, &row.course_id)?;
    require_course_manager(actor, &course)?;

    conn.execute("DELETE FROM grades WHERE id = ?", [&grade_id])?;
    tracing::info!(grade_id = %grade_id, "grade deleted");
    Ok(json!({ "deleted": true }))
}

fn handle_grades_mine(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_role(actor, &[Role::Student])?;

    let rows = db::grades_list(
        conn,
        &GradeFilter {
            user_id: Some(&actor.user_id),
            ..GradeFilter::default()
        },
    )?;
    let total_courses = rows
        .iter()
        .map(|g| g.course_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let embed = Embed {
        course: true,
        assignment: true,
        ..Embed::default()
    };
    let stats = calc::student_academic_stats(conn, &actor.user_id)?;
    Ok(json!({
        "grades": to_json(&shape_grades(conn, &rows, embed)?)?,
        "totalCourses": total_courses,
        "gpa": stats.gpa,
    }))
}

fn handle_grades_by_course(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let rows = db::grades_list(
        conn,
        &GradeFilter {
            course_id: Some(&course_id),
            ..GradeFilter::default()
        },
    )?;
    let embed = Embed {
        student: true,
        assignment: true,
        ..Embed::default()
    };
    Ok(json!({ "grades": to_json(&shape_grades(conn, &rows, embed)?)? }))
}

fn handle_grades_by_student(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;
    let course_id = opt_str(&req.params, "courseId");

    let rows = db::grades_list(
        conn,
        &GradeFilter {
            user_id: Some(&student_id),
            course_id: course_id.as_deref(),
            ..GradeFilter::default()
        },
    )?;
    let embed = Embed {
        course: true,
        assignment: true,
        ..Embed::default()
    };
    Ok(json!({ "grades": to_json(&shape_grades(conn, &rows, embed)?)? }))
}

fn handle_grades_by_assignment(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let assignment_id = str_param(&req.params, "assignmentId")?;
    let assignment =
        db::assignment_get(conn, &assignment_id)?.ok_or(LmsError::NotFound("assignment"))?;
    let course = load_course(conn, &assignment.course_id)?;
    require_course_manager(actor, &course)?;

    let rows = db::grades_list(
        conn,
        &GradeFilter {
            assignment_id: Some(&assignment_id),
            ..GradeFilter::default()
        },
    )?;
    let embed = Embed {
        student: true,
        ..Embed::default()
    };
    Ok(json!({
        "assignment": to_json(&shape::assignment_view(&assignment))?,
        "grades": to_json(&shape_grades(conn, &rows, embed)?)?,
    }))
}

/// Stateless letter lookup; works without a workspace.
fn handle_grades_letter(req: &Request) -> LmsResult<serde_json::Value> {
    let score = opt_f64(&req.params, "score")?.ok_or_else(|| LmsError::bad_params("missing score"))?;
    let policy = match opt_str(&req.params, "policy") {
        Some(raw) => LetterPolicy::parse(&raw)
            .ok_or_else(|| LmsError::bad_params(format!("unknown policy: {raw}")))?,
        None => LetterPolicy::Fine,
    };
    let letter = policy.letter_for(score);
    Ok(json!({
        "policy": policy,
        "score": calc::clamp_score(score),
        "letter": letter,
        "gradePoint": calc::grade_point(letter),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.create" => handle_grades_create(state, req),
        "grades.update" => handle_grades_update(state, req),
        "grades.delete" => handle_grades_delete(state, req),
        "grades.mine" => handle_grades_mine(state, req),
        "grades.byCourse" => handle_grades_by_course(state, req),
        "grades.byStudent" => handle_grades_by_student(state, req),
        "grades.byAssignment" => handle_grades_by_assignment(state, req),
        "grades.letter" => handle_grades_letter(req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
