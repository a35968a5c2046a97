use crate::calc::{self, StudentCourseContext};
use crate::db::{self, CourseFilter, CourseRow};
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, opt_bool, require_actor, require_conn, str_param, student_id_param, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::shape::{self, StudentCourseParts, StudentCourseView};
use rusqlite::Connection;
use serde_json::json;

fn course_for_student(
    conn: &Connection,
    student_id: &str,
    course: &CourseRow,
    with_assignments: bool,
) -> LmsResult<StudentCourseView> {
    let ctx = StudentCourseContext {
        conn,
        student_id,
        course_id: &course.id,
    };
    let progress = ctx.progress()?;
    let grade = ctx.course_grade()?;
    let instructor = match course.instructor_id.as_deref() {
        Some(id) => db::user_get(conn, id)?,
        None => None,
    };
    let assignments = if with_assignments {
        Some(db::assignments_for_course(conn, &course.id)?)
    } else {
        None
    };
    Ok(shape::student_course_view(StudentCourseParts {
        course,
        instructor: instructor.as_ref(),
        progress: &progress,
        grade: &grade,
        assignments: assignments.as_deref(),
    }))
}

/// Every course the student has an enrollment for, whatever its status.
fn handle_students_courses(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;

    let mut courses = Vec::new();
    for e in db::enrollments_for_student(conn, &student_id)? {
        let Some(course) = db::course_get(conn, &e.course_id)? else {
            continue;
        };
        courses.push(course_for_student(conn, &student_id, &course, false)?);
    }
    Ok(json!({ "courses": to_json(&courses)? }))
}

/// The whole catalog seen through one student: unenrolled courses report zero progress.
fn handle_students_catalog(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;
    let filter = CourseFilter {
        active_only: opt_bool(&req.params, "activeOnly")?.unwrap_or(false),
        ..CourseFilter::default()
    };

    let courses = db::courses_list(conn, &filter)?
        .iter()
        .map(|c| course_for_student(conn, &student_id, c, false))
        .collect::<LmsResult<Vec<_>>>()?;
    Ok(json!({ "courses": to_json(&courses)? }))
}

fn handle_students_course(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    let view = course_for_student(conn, &student_id, &course, true)?;
    Ok(json!({ "course": to_json(&view)? }))
}

fn handle_students_profile(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let student_id = student_id_param(req, actor)?;
    let student = db::user_get(conn, &student_id)?.ok_or(LmsError::NotFound("student"))?;
    let stats = calc::student_academic_stats(conn, &student_id)?;
    Ok(json!({
        "student": to_json(&shape::user_view(&student))?,
        "coursesCompleted": stats.courses_completed,
        "totalSks": stats.total_sks,
        "totalCredits": stats.total_credits,
        "gpa": stats.gpa,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.courses" => handle_students_courses(state, req),
        "students.catalog" => handle_students_catalog(state, req),
        "students.course" => handle_students_course(state, req),
        "students.profile" => handle_students_profile(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
