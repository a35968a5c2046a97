use crate::db;
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, opt_f64, opt_str, require_actor, require_conn, require_course_manager, str_param,
    to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::shape;
use serde_json::json;
use uuid::Uuid;

fn handle_assignments_create(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let title = str_param(&req.params, "title")?;
    let description = opt_str(&req.params, "description");
    let due_date = opt_str(&req.params, "dueDate");
    let max_points = opt_f64(&req.params, "maxPoints")?.unwrap_or(100.0);
    if max_points <= 0.0 {
        return Err(LmsError::bad_params("maxPoints must be greater than 0"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assignments(id, course_id, title, description, due_date, max_points, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &course_id,
            &title,
            &description,
            &due_date,
            max_points,
            db::now_rfc3339(),
        ),
    )?;
    tracing::info!(assignment_id = %id, course_id = %course_id, "assignment created");

    let row = db::assignment_get(conn, &id)?.ok_or(LmsError::NotFound("assignment"))?;
    Ok(json!({ "assignment": to_json(&shape::assignment_view(&row))? }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let course_id = str_param(&req.params, "courseId")?;
    load_course(conn, &course_id)?;
    let assignments: Vec<_> = db::assignments_for_course(conn, &course_id)?
        .iter()
        .map(shape::assignment_view)
        .collect();
    Ok(json!({ "assignments": to_json(&assignments)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.create" => handle_assignments_create(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
