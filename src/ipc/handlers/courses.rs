use crate::db::{self, CourseFilter, CourseRow};
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, opt_bool, opt_i64, opt_str, require_actor, require_conn, require_course_manager,
    require_staff, str_param, to_json,
};
use crate::ipc::types::{AppState, Request, Role};
use crate::shape::{self, CourseView};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const SEMESTERS: [&str; 3] = ["Fall", "Spring", "Summer"];

struct CourseFields {
    code: Option<String>,
    name: Option<String>,
    description: Option<String>,
    instructor_id: Option<String>,
    faculty_id: Option<String>,
    major_id: Option<String>,
    credit_hours: Option<i64>,
    capacity: Option<i64>,
    semester: Option<String>,
    year: Option<i64>,
    schedule: Option<String>,
    room: Option<String>,
    mode: Option<String>,
    image_url: Option<String>,
    is_active: Option<bool>,
}

fn parse_course_fields(params: &serde_json::Value) -> LmsResult<CourseFields> {
    let f = CourseFields {
        code: opt_str(params, "code"),
        name: opt_str(params, "name"),
        description: opt_str(params, "description"),
        instructor_id: opt_str(params, "instructorId"),
        faculty_id: opt_str(params, "facultyId"),
        major_id: opt_str(params, "majorId"),
        credit_hours: opt_i64(params, "creditHours")?,
        capacity: opt_i64(params, "capacity")?,
        semester: opt_str(params, "semester"),
        year: opt_i64(params, "year")?,
        schedule: opt_str(params, "schedule"),
        room: opt_str(params, "room"),
        mode: opt_str(params, "mode"),
        image_url: opt_str(params, "imageUrl"),
        is_active: opt_bool(params, "isActive")?,
    };

    if let Some(code) = f.code.as_deref() {
        if code.len() > 50 {
            return Err(LmsError::bad_params("code must be at most 50 characters"));
        }
    }
    if let Some(name) = f.name.as_deref() {
        if name.len() > 255 {
            return Err(LmsError::bad_params("name must be at most 255 characters"));
        }
    }
    if matches!(f.credit_hours, Some(h) if h < 1) {
        return Err(LmsError::bad_params("creditHours must be at least 1"));
    }
    if matches!(f.capacity, Some(c) if c < 1) {
        return Err(LmsError::bad_params("capacity must be at least 1"));
    }
    if let Some(s) = f.semester.as_deref() {
        if !SEMESTERS.contains(&s) {
            return Err(LmsError::bad_params("semester must be Fall, Spring or Summer"));
        }
    }
    if matches!(f.year, Some(y) if !(2000..=2100).contains(&y)) {
        return Err(LmsError::bad_params("year must be between 2000 and 2100"));
    }
    Ok(f)
}

fn ensure_instructor(conn: &Connection, instructor_id: &str) -> LmsResult<()> {
    let user = db::user_get(conn, instructor_id)?.ok_or(LmsError::NotFound("instructor"))?;
    if user.role != Role::Faculty.as_str() {
        return Err(LmsError::bad_params("instructorId must refer to a faculty member"));
    }
    Ok(())
}

fn code_taken(conn: &Connection, code: &str, except_id: Option<&str>) -> LmsResult<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE code = ? AND (? IS NULL OR id <> ?)",
        (code, except_id, except_id),
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Course view with the instructor relation loaded.
pub(crate) fn loaded_course_view(conn: &Connection, course: &CourseRow) -> LmsResult<CourseView> {
    let instructor = match course.instructor_id.as_deref() {
        Some(id) => db::user_get(conn, id)?,
        None => None,
    };
    Ok(shape::course_view(course, instructor.as_ref()))
}

fn course_json(conn: &Connection, course: &CourseRow) -> LmsResult<serde_json::Value> {
    to_json(&loaded_course_view(conn, course)?)
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_staff(actor)?;

    let f = parse_course_fields(&req.params)?;
    let code = f.code.ok_or_else(|| LmsError::bad_params("missing code"))?;
    let name = f.name.ok_or_else(|| LmsError::bad_params("missing name"))?;

    let instructor_id = match (actor.role, f.instructor_id) {
        (Role::Faculty, Some(id)) if id != actor.user_id => {
            return Err(LmsError::Forbidden(
                "faculty may only create courses they teach".to_string(),
            ))
        }
        (Role::Faculty, _) => Some(actor.user_id.clone()),
        (_, other) => other,
    };
    if let Some(id) = instructor_id.as_deref() {
        ensure_instructor(conn, id)?;
    }
    if code_taken(conn, &code, None)? {
        return Err(LmsError::Conflict(format!("course code already exists: {code}")));
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO courses(
            id, code, name, description, instructor_id, faculty_id, major_id,
            credit_hours, capacity, current_enrollment, semester, year, schedule, room,
            mode, image_url, is_active, created_at, updated_at
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
        rusqlite::params![
            id,
            code,
            name,
            f.description,
            instructor_id,
            f.faculty_id,
            f.major_id,
            f.credit_hours.unwrap_or(3),
            f.capacity.unwrap_or(50),
            f.semester.unwrap_or_else(|| "Fall".to_string()),
            f.year,
            f.schedule,
            f.room,
            f.mode,
            f.image_url,
            f.is_active.unwrap_or(true) as i64,
            now,
        ],
    )?;
    tracing::info!(course_id = %id, code = %code, "course created");

    let course = load_course(conn, &id)?;
    Ok(json!({ "course": course_json(conn, &course)? }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let f = parse_course_fields(&req.params)?;
    if let Some(code) = f.code.as_deref() {
        if code_taken(conn, code, Some(&course_id))? {
            return Err(LmsError::Conflict(format!("course code already exists: {code}")));
        }
    }
    if let Some(id) = f.instructor_id.as_deref() {
        if actor.role == Role::Faculty {
            return Err(LmsError::Forbidden(
                "faculty may not reassign instructors".to_string(),
            ));
        }
        ensure_instructor(conn, id)?;
    }
    if let Some(cap) = f.capacity {
        if cap < course.current_enrollment {
            return Err(LmsError::Conflict(format!(
                "capacity {cap} is below the {} students already enrolled",
                course.current_enrollment
            )));
        }
    }

    conn.execute(
        "UPDATE courses SET
            code = COALESCE(?1, code),
            name = COALESCE(?2, name),
            description = COALESCE(?3, description),
            instructor_id = COALESCE(?4, instructor_id),
            faculty_id = COALESCE(?5, faculty_id),
            major_id = COALESCE(?6, major_id),
            credit_hours = COALESCE(?7, credit_hours),
            capacity = COALESCE(?8, capacity),
            semester = COALESCE(?9, semester),
            year = COALESCE(?10, year),
            schedule = COALESCE(?11, schedule),
            room = COALESCE(?12, room),
            mode = COALESCE(?13, mode),
            image_url = COALESCE(?14, image_url),
            is_active = COALESCE(?15, is_active),
            updated_at = ?16
         WHERE id = ?17",
        rusqlite::params![
            f.code,
            f.name,
            f.description,
            f.instructor_id,
            f.faculty_id,
            f.major_id,
            f.credit_hours,
            f.capacity,
            f.semester,
            f.year,
            f.schedule,
            f.room,
            f.mode,
            f.image_url,
            f.is_active.map(|b| b as i64),
            db::now_rfc3339(),
            course_id,
        ],
    )?;

    let course = load_course(conn, &course_id)?;
    Ok(json!({ "course": course_json(conn, &course)? }))
}

/// Soft delete. Enrollments and grades stay but vanish from every view.
fn handle_courses_delete(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let now = db::now_rfc3339();
    conn.execute(
        "UPDATE courses SET deleted_at = ?, updated_at = ? WHERE id = ?",
        (&now, &now, &course_id),
    )?;
    tracing::info!(course_id = %course_id, "course soft-deleted");
    Ok(json!({ "deleted": true }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let filter = CourseFilter {
        semester: opt_str(&req.params, "semester"),
        year: opt_i64(&req.params, "year")?,
        major_id: opt_str(&req.params, "majorId"),
        instructor_id: opt_str(&req.params, "instructorId"),
        active_only: opt_bool(&req.params, "activeOnly")?.unwrap_or(false),
    };
    let courses = db::courses_list(conn, &filter)?
        .iter()
        .map(|c| course_json(conn, c))
        .collect::<LmsResult<Vec<_>>>()?;
    Ok(json!({ "courses": courses }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    Ok(json!({ "course": course_json(conn, &course)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.create" => handle_courses_create(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        "courses.list" => handle_courses_list(state, req),
        "courses.get" => handle_courses_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
