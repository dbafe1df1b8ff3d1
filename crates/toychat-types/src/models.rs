use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role tag carried by rows of the `users` and `admins` tables.
/// Tables without roles (dialogs, messages) leave it as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "agent")]
    Agent,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::User => "user",
            Self::Agent => "agent",
            Self::Admin => "admin",
            Self::SuperAdmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Generic record shared by every table.
///
/// Carries the superset of fields used by users, admins/agents, dialogs and
/// messages. Which fields are meaningful is decided by the column lists of the
/// enclosing [`Exchange`](crate::Exchange): a write payload only needs the
/// columns named in `put`/`spec`, a read result has exactly the `get` columns
/// populated and everything else left at its zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Only the hashed form is ever persisted.
    pub hashed_password: String,
    pub created: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub role: Role,
    pub active: bool,
    pub online: bool,
    pub dialog_id: i64,
    pub agent_id: i64,
    pub message_id: i64,
    pub message: String,
    /// Open dialogs currently assigned to an agent. Used for load balancing only.
    pub dialog_count: i64,
}
