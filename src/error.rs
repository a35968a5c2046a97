use serde_json::json;
use thiserror::Error;

/// Failures surfaced to clients. Each variant maps to a stable wire code.
#[derive(Debug, Error)]
pub enum LmsError {
    #[error("{0}")]
    BadParams(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("cannot {action} an enrollment that is {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("course is full ({capacity} seats)")]
    CourseFull { course_id: String, capacity: i64 },

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl LmsError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::NoWorkspace => "no_workspace",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CourseFull { .. } => "course_full",
            Self::Db(_) | Self::Store(_) => "db_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidTransition { from, action } => {
                Some(json!({ "status": from, "action": action }))
            }
            Self::CourseFull {
                course_id,
                capacity,
            } => Some(json!({ "courseId": course_id, "capacity": capacity })),
            _ => None,
        }
    }
}

pub type LmsResult<T> = Result<T, LmsError>;
