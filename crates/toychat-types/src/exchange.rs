use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ExchangeError};
use crate::models::Row;
use crate::tables;

/// Requested operation. Travels as a plain string so that an action this
/// build does not know still decodes and can be answered with a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Insert,
    Get,
    Put,
    AgentSelect,
    Other(UnknownAction),
}

/// Name of an action outside the known set. Only built through
/// `Action::from`, so it never holds a name that has its own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(String);

impl UnknownAction {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insert => "insert",
            Self::Get => "get",
            Self::Put => "put",
            Self::AgentSelect => "agent",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.as_str() {
            "insert" => Self::Insert,
            "get" => Self::Get,
            "put" => Self::Put,
            "agent" => Self::AgentSelect,
            _ => Self::Other(UnknownAction(s)),
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(UnknownAction(s)) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// One request or reply travelling between a caller and the storage dispatcher.
///
/// Column lists are plain column names; the storage side resolves them against
/// its schema registry. `spec` columns form an AND of equalities. On the way
/// out `rows` carries write payloads or filter values, on the way back it
/// carries result rows. `err_kind`/`err` are only set on replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub table: String,
    #[serde(default)]
    pub put: Vec<String>,
    #[serde(default)]
    pub spec: Vec<String>,
    #[serde(default)]
    pub get: Vec<String>,
    pub action: Action,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub err_kind: ErrorKind,
    #[serde(default)]
    pub err: String,
}

impl Exchange {
    pub fn new(table: impl Into<String>, action: Action) -> Self {
        Self {
            table: table.into(),
            put: Vec::new(),
            spec: Vec::new(),
            get: Vec::new(),
            action,
            rows: Vec::new(),
            err_kind: ErrorKind::None,
            err: String::new(),
        }
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(table, Action::Insert)
    }

    pub fn get(table: impl Into<String>) -> Self {
        Self::new(table, Action::Get)
    }

    pub fn put(table: impl Into<String>) -> Self {
        Self::new(table, Action::Put)
    }

    pub fn agent_select() -> Self {
        Self::new(tables::ADMINS, Action::AgentSelect)
    }

    pub fn with_put(mut self, columns: &[&str]) -> Self {
        self.put = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_spec(mut self, columns: &[&str]) -> Self {
        self.spec = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_get(mut self, columns: &[&str]) -> Self {
        self.get = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_row(self, row: Row) -> Self {
        self.with_rows(vec![row])
    }

    /// Turn a request into its reply. On failure the rows are cleared so a
    /// reply never carries both an error and data.
    pub fn into_reply(mut self, outcome: Result<Vec<Row>, ExchangeError>) -> Self {
        match outcome {
            Ok(rows) => {
                self.rows = rows;
                self.err_kind = ErrorKind::None;
                self.err.clear();
            }
            Err(e) => {
                self.rows.clear();
                self.err_kind = e.kind();
                self.err = e.to_string();
            }
        }
        self
    }

    /// Reply for an inbound message that could not be decoded at all.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(String::new(), Action::from(""))
            .into_reply(Err(ExchangeError::MalformedEnvelope(detail.into())))
    }

    /// Outcome carried by a reply.
    pub fn outcome(&self) -> Result<(), ExchangeError> {
        match ExchangeError::from_wire(self.err_kind, &self.err) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
