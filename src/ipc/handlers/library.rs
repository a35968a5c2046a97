use crate::db;
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, opt_bool, opt_i64, opt_str, require_actor, require_conn, require_course_manager,
    require_staff, str_param, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::shape;
use serde_json::json;
use uuid::Uuid;

/// Tags arrive either as a JSON array or a comma list; both are stored as given.
fn tags_param(params: &serde_json::Value) -> LmsResult<Option<String>> {
    match params.get("tags") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(v @ serde_json::Value::Array(_)) => Ok(Some(v.to_string())),
        Some(_) => Err(LmsError::bad_params("tags must be a string or an array")),
    }
}

fn handle_library_create(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_staff(actor)?;

    let course_id = opt_str(&req.params, "courseId");
    if let Some(id) = course_id.as_deref() {
        let course = load_course(conn, id)?;
        require_course_manager(actor, &course)?;
    }
    let title = str_param(&req.params, "title")?;
    let file_url = opt_str(&req.params, "fileUrl");
    let external_link = opt_str(&req.params, "externalLink");
    if file_url.is_none() && external_link.is_none() {
        return Err(LmsError::bad_params("fileUrl or externalLink is required"));
    }
    let file_size = opt_i64(&req.params, "fileSize")?;
    if matches!(file_size, Some(n) if n < 0) {
        return Err(LmsError::bad_params("fileSize must not be negative"));
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO library_resources(
            id, course_id, title, description, resource_type, file_url, file_size,
            external_link, author, tags, is_published, created_by, created_at, updated_at
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        rusqlite::params![
            id,
            course_id,
            title,
            opt_str(&req.params, "description"),
            opt_str(&req.params, "resourceType"),
            file_url,
            file_size,
            external_link,
            opt_str(&req.params, "author"),
            tags_param(&req.params)?,
            opt_bool(&req.params, "isPublished")?.unwrap_or(true) as i64,
            actor.user_id,
            now,
        ],
    )?;
    tracing::info!(resource_id = %id, "library resource created");

    let row = db::library_resource_get(conn, &id)?.ok_or(LmsError::NotFound("resource"))?;
    Ok(json!({ "resource": to_json(&shape::library_resource_view(&row))? }))
}

/// Unpublished resources are listed for staff only.
fn handle_library_list(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let include_unpublished = req.actor.as_ref().is_some_and(|a| a.role.is_staff());
    let course_id = opt_str(&req.params, "courseId");

    let resources: Vec<_> =
        db::library_resources_list(conn, course_id.as_deref(), include_unpublished)?
            .iter()
            .map(shape::library_resource_view)
            .collect();
    Ok(json!({ "resources": to_json(&resources)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "library.create" => handle_library_create(state, req),
        "library.list" => handle_library_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
