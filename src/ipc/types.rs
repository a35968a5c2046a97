use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Caller identity, resolved by the fronting API. Absent for anonymous calls.
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Faculty,
    ProdiAdmin,
    Management,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "student" => Some(Self::Student),
            "faculty" => Some(Self::Faculty),
            "prodi_admin" => Some(Self::ProdiAdmin),
            "management" => Some(Self::Management),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::ProdiAdmin => "prodi_admin",
            Self::Management => "management",
        }
    }

    pub fn is_staff(self) -> bool {
        !matches!(self, Self::Student)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::ProdiAdmin | Self::Management)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
