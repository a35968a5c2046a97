use crate::db;
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    opt_str, require_actor, require_admin, require_conn, require_self_or_staff, require_staff,
    str_param, to_json,
};
use crate::ipc::types::{AppState, Request, Role};
use crate::shape;
use serde_json::json;
use uuid::Uuid;

fn handle_users_create(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_admin(actor)?;

    let name = str_param(&req.params, "name")?;
    let email = str_param(&req.params, "email")?.to_ascii_lowercase();
    if !email.contains('@') {
        return Err(LmsError::bad_params("email must be a valid address"));
    }
    let role_raw = str_param(&req.params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| LmsError::bad_params(format!("unknown role: {role_raw}")))?;
    let student_no = opt_str(&req.params, "studentId");
    let major_id = opt_str(&req.params, "majorId");

    let taken: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?",
        [&email],
        |r| r.get(0),
    )?;
    if taken > 0 {
        return Err(LmsError::Conflict(format!("email already registered: {email}")));
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO users(id, name, email, role, student_no, major_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (&id, &name, &email, role.as_str(), &student_no, &major_id, &now, &now),
    )?;
    tracing::info!(user_id = %id, role = role.as_str(), "user created");

    let user = db::user_get(conn, &id)?.ok_or(LmsError::NotFound("user"))?;
    Ok(json!({ "user": to_json(&shape::user_view(&user))? }))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_staff(actor)?;

    let role = opt_str(&req.params, "role");
    if let Some(r) = role.as_deref() {
        if Role::parse(r).is_none() {
            return Err(LmsError::bad_params(format!("unknown role: {r}")));
        }
    }
    let users: Vec<_> = db::users_list(conn, role.as_deref())?
        .iter()
        .map(shape::user_view)
        .collect();
    Ok(json!({ "users": to_json(&users)? }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let user_id = str_param(&req.params, "userId")?;
    require_self_or_staff(actor, &user_id)?;

    let user = db::user_get(conn, &user_id)?.ok_or(LmsError::NotFound("user"))?;
    Ok(json!({ "user": to_json(&shape::user_view(&user))? }))
}

/// Soft delete; grades and enrollments stay for the academic record.
fn handle_users_delete(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_admin(actor)?;
    let user_id = str_param(&req.params, "userId")?;
    if user_id == actor.user_id {
        return Err(LmsError::Conflict("cannot delete yourself".to_string()));
    }

    let now = db::now_rfc3339();
    let changed = conn.execute(
        "UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        (&now, &now, &user_id),
    )?;
    if changed == 0 {
        return Err(LmsError::NotFound("user"));
    }
    tracing::info!(user_id = %user_id, "user soft-deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => handle_users_create(state, req),
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.delete" => handle_users_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
