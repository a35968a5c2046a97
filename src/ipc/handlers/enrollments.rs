use crate::db::{self, EnrollmentRow};
use crate::enrollment;
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::handlers::courses::loaded_course_view;
use crate::ipc::helpers::{
    load_course, opt_f64, opt_i64, opt_str, require_actor, require_conn, require_course_manager,
    str_param, student_id_param, to_json,
};
use crate::ipc::types::{Actor, AppState, Request, Role};
use crate::shape::{self, EnrollmentView};
use rusqlite::Connection;
use serde_json::json;

fn load_enrollment(conn: &Connection, enrollment_id: &str) -> LmsResult<EnrollmentRow> {
    db::enrollment_get(conn, enrollment_id)?.ok_or(LmsError::NotFound("enrollment"))
}

/// The enrolled student, or staff in charge of the course.
fn require_owner_or_manager(conn: &Connection, actor: &Actor, row: &EnrollmentRow) -> LmsResult<()> {
    if actor.role == Role::Student {
        if actor.user_id == row.student_id {
            return Ok(());
        }
        return Err(LmsError::Forbidden(
            "students may only manage their own enrollments".to_string(),
        ));
    }
    let course = load_course(conn, &row.course_id)?;
    require_course_manager(actor, &course)
}

fn require_manager_of(conn: &Connection, actor: &Actor, row: &EnrollmentRow) -> LmsResult<()> {
    let course = load_course(conn, &row.course_id)?;
    require_course_manager(actor, &course)
}

fn with_course(conn: &Connection, row: &EnrollmentRow) -> LmsResult<EnrollmentView> {
    let course = match db::course_get(conn, &row.course_id)? {
        Some(c) => Some(loaded_course_view(conn, &c)?),
        None => None,
    };
    Ok(shape::enrollment_view(row, course, None))
}

fn with_student(conn: &Connection, row: &EnrollmentRow) -> LmsResult<EnrollmentView> {
    let student = db::user_get(conn, &row.student_id)?.map(|u| shape::user_view(&u));
    Ok(shape::enrollment_view(row, None, student))
}

fn enrollment_json(row: &EnrollmentRow) -> LmsResult<serde_json::Value> {
    Ok(json!({ "enrollment": to_json(&shape::enrollment_view(row, None, None))? }))
}

fn handle_enrollments_request(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = match actor.role {
        Role::Student => student_id_param(req, actor)?,
        Role::ProdiAdmin | Role::Management => str_param(&req.params, "studentId")?,
        Role::Faculty => {
            return Err(LmsError::Forbidden(
                "faculty cannot request enrollments".to_string(),
            ))
        }
    };
    let course_id = str_param(&req.params, "courseId")?;
    let notes = opt_str(&req.params, "notes");

    let row = enrollment::request(conn, &student_id, &course_id, notes.as_deref())?;
    Ok(json!({ "enrollment": to_json(&with_course(conn, &row)?)? }))
}

fn handle_enrollments_approve(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_manager_of(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    enrollment_json(&enrollment::approve(conn, &enrollment_id)?)
}

fn handle_enrollments_reject(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_manager_of(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    enrollment_json(&enrollment::reject(conn, &enrollment_id)?)
}

fn handle_enrollments_drop(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_owner_or_manager(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    enrollment_json(&enrollment::drop_enrollment(conn, &enrollment_id)?)
}

fn handle_enrollments_complete(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_manager_of(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    let final_grade = opt_f64(&req.params, "finalGrade")?;
    enrollment_json(&enrollment::complete(conn, &enrollment_id, final_grade)?)
}

fn handle_enrollments_set_progress(
    state: &mut AppState,
    req: &Request,
) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_manager_of(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    let progress = opt_i64(&req.params, "progress")?
        .ok_or_else(|| LmsError::bad_params("missing progress"))?;
    enrollment_json(&enrollment::set_progress(conn, &enrollment_id, progress)?)
}

fn handle_enrollments_mine(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;
    let status = opt_str(&req.params, "status");

    let enrollments = db::enrollments_for_student(conn, &student_id)?
        .iter()
        .filter(|e| status.as_deref().map_or(true, |s| e.status == s))
        .map(|e| with_course(conn, e))
        .collect::<LmsResult<Vec<_>>>()?;
    Ok(json!({ "enrollments": to_json(&enrollments)? }))
}

fn handle_enrollments_by_course(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;
    let status = opt_str(&req.params, "status");

    let enrollments = db::enrollments_for_course(conn, &course_id)?
        .iter()
        .filter(|e| status.as_deref().map_or(true, |s| e.status == s))
        .map(|e| with_student(conn, e))
        .collect::<LmsResult<Vec<_>>>()?;
    Ok(json!({ "enrollments": to_json(&enrollments)? }))
}

fn handle_enrollments_delete(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let enrollment_id = str_param(&req.params, "enrollmentId")?;
    require_manager_of(conn, actor, &load_enrollment(conn, &enrollment_id)?)?;
    enrollment::delete(conn, &enrollment_id)?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollments.request" => handle_enrollments_request(state, req),
        "enrollments.approve" => handle_enrollments_approve(state, req),
        "enrollments.reject" => handle_enrollments_reject(state, req),
        "enrollments.drop" => handle_enrollments_drop(state, req),
        "enrollments.complete" => handle_enrollments_complete(state, req),
        "enrollments.setProgress" => handle_enrollments_set_progress(state, req),
        "enrollments.mine" => handle_enrollments_mine(state, req),
        "enrollments.byCourse" => handle_enrollments_by_course(state, req),
        "enrollments.delete" => handle_enrollments_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
