use crate::db;
use crate::error::{LmsError, LmsResult};
use crate::ipc::error::{err, ok, respond};
use crate::ipc::helpers::{
    opt_f64, pass_threshold, require_actor, require_admin, require_conn, PASS_THRESHOLD_KEY,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => {
            tracing::error!(workspace = %path.display(), error = ?e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_settings_get(state: &mut AppState, _req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    Ok(json!({ "passThreshold": pass_threshold(conn)? }))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    require_admin(actor)?;

    if let Some(t) = opt_f64(&req.params, "passThreshold")? {
        if !(0.0..=100.0).contains(&t) {
            return Err(LmsError::bad_params("passThreshold must be between 0 and 100"));
        }
        db::settings_set_json(conn, PASS_THRESHOLD_KEY, &json!(t))?;
        tracing::info!(pass_threshold = t, "pass threshold updated");
    }
    Ok(json!({ "passThreshold": pass_threshold(conn)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "workspace.select" => return Some(handle_workspace_select(state, req)),
        "settings.get" => handle_settings_get(state, req),
        "settings.update" => handle_settings_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
