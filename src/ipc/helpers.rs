use crate::calc;
use crate::db::{self, CourseRow};
use crate::error::{LmsError, LmsResult};
use crate::ipc::types::{Actor, AppState, Request, Role};
use rusqlite::Connection;
use serde::Serialize;

pub fn require_conn(state: &AppState) -> LmsResult<&Connection> {
    state.db.as_ref().ok_or(LmsError::NoWorkspace)
}

pub fn require_actor(req: &Request) -> LmsResult<&Actor> {
    req.actor
        .as_ref()
        .ok_or_else(|| LmsError::Forbidden(format!("{} requires an actor", req.method)))
}

pub fn require_role(actor: &Actor, allowed: &[Role]) -> LmsResult<()> {
    if allowed.contains(&actor.role) {
        return Ok(());
    }
    Err(LmsError::Forbidden(format!(
        "role {} may not perform this action",
        actor.role.as_str()
    )))
}

pub fn require_staff(actor: &Actor) -> LmsResult<()> {
    require_role(actor, &[Role::Faculty, Role::ProdiAdmin, Role::Management])
}

pub fn require_admin(actor: &Actor) -> LmsResult<()> {
    if actor.role.is_admin() {
        return Ok(());
    }
    Err(LmsError::Forbidden(format!(
        "role {} may not administer the workspace",
        actor.role.as_str()
    )))
}

/// Students see only themselves; staff see anyone.
pub fn require_self_or_staff(actor: &Actor, student_id: &str) -> LmsResult<()> {
    if actor.role.is_staff() || actor.user_id == student_id {
        return Ok(());
    }
    Err(LmsError::Forbidden(
        "students may only access their own records".to_string(),
    ))
}

/// Faculty manage only the courses they teach; admins manage all.
pub fn require_course_manager(actor: &Actor, course: &CourseRow) -> LmsResult<()> {
    require_staff(actor)?;
    if actor.role == Role::Faculty
        && course.instructor_id.as_deref() != Some(actor.user_id.as_str())
    {
        return Err(LmsError::Forbidden(
            "faculty may only manage their own courses".to_string(),
        ));
    }
    Ok(())
}

pub fn load_course(conn: &Connection, course_id: &str) -> LmsResult<CourseRow> {
    db::course_get(conn, course_id)?.ok_or(LmsError::NotFound("course"))
}

/// Student id from `params.studentId`, defaulting to the actor.
pub fn student_id_param(req: &Request, actor: &Actor) -> LmsResult<String> {
    let student_id = opt_str(&req.params, "studentId").unwrap_or_else(|| actor.user_id.clone());
    require_self_or_staff(actor, &student_id)?;
    Ok(student_id)
}

pub fn str_param(params: &serde_json::Value, key: &str) -> LmsResult<String> {
    opt_str(params, key).ok_or_else(|| LmsError::bad_params(format!("missing {key}")))
}

/// Trimmed string; empty counts as absent.
pub fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn opt_i64(params: &serde_json::Value, key: &str) -> LmsResult<Option<i64>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| LmsError::bad_params(format!("{key} must be an integer"))),
    }
}

pub fn opt_f64(params: &serde_json::Value, key: &str) -> LmsResult<Option<f64>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| LmsError::bad_params(format!("{key} must be a number"))),
    }
}

pub fn opt_bool(params: &serde_json::Value, key: &str) -> LmsResult<Option<bool>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| LmsError::bad_params(format!("{key} must be a boolean"))),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> LmsResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| LmsError::Store(e.into()))
}

pub const PASS_THRESHOLD_KEY: &str = "grading.passThreshold";

/// Workspace pass mark, falling back to the default when unset or malformed.
pub fn pass_threshold(conn: &Connection) -> LmsResult<f64> {
    let stored = db::settings_get_json(conn, PASS_THRESHOLD_KEY)?;
    Ok(stored
        .and_then(|v| v.as_f64())
        .filter(|t| (0.0..=100.0).contains(t))
        .unwrap_or(calc::DEFAULT_PASS_THRESHOLD))
}
