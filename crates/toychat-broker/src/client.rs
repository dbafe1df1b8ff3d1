use std::time::Duration;

use bytes::Bytes;
use toychat_types::{Exchange, ExchangeError, Role, Row, codec, tables};
use tracing::{debug, warn};

use crate::credentials;
use crate::transport::{Transport, TransportError};

/// Columns returned when authenticating against `users` or `admins`.
const AUTH_COLUMNS: &[&str] = &["id", "name", "email", "hashed_password", "created", "role", "active", "online"];

/// Columns shown when listing or loading a person.
const PROFILE_COLUMNS: &[&str] = &["id", "name", "email", "created", "role", "active", "online"];

const DIALOG_COLUMNS: &[&str] = &["dialog_id", "user_id", "agent_id", "started", "ended"];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Subject the storage manager listens on.
    pub subject: String,
    /// How long to wait for a reply before giving up.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            subject: "forDB".into(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Caller side of the exchange protocol.
///
/// Each method builds a fresh [`Exchange`], sends it to the storage manager,
/// and waits at most `config.timeout` for the reply. Clones share the
/// underlying transport connection.
#[derive(Clone)]
pub struct ExchangeClient<T: Transport> {
    transport: T,
    config: ClientConfig,
}

impl<T: Transport> ExchangeClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Publish `payload` on `subject` and wait for the single reply.
    /// Works for any subject, not only the storage manager's.
    pub async fn send(&self, subject: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, self.transport.request(subject, payload))
            .await
            .map_err(|_| TransportError::Timeout {
                subject: subject.to_string(),
                timeout,
            })?
    }

    /// Send an exchange to the storage manager and return the decoded reply.
    /// A reply carrying an error kind comes back as that error.
    pub async fn run(&self, exchange: Exchange) -> Result<Exchange, ExchangeError> {
        let payload = codec::encode(&exchange)?;
        let answer = self
            .send(&self.config.subject, payload.into())
            .await
            .inspect_err(|e| warn!(table = %exchange.table, action = %exchange.action, "{}", e))?;

        let reply = codec::decode(&answer)?;
        if let Err(e) = reply.outcome() {
            if e.is_negative_outcome() {
                debug!(table = %exchange.table, action = %exchange.action, "{}", e);
            } else {
                warn!(table = %exchange.table, action = %exchange.action, "{}", e);
            }
            return Err(e);
        }
        Ok(reply)
    }

    async fn run_single(&self, exchange: Exchange) -> Result<Row, ExchangeError> {
        let action = exchange.action.clone();
        let mut rows = self.run(exchange).await?.rows;
        if rows.len() != 1 {
            return Err(ExchangeError::failure(format!(
                "{} brought back {} records",
                action,
                rows.len()
            )));
        }
        Ok(rows.remove(0))
    }

    // -- People --

    /// Load an active person by email and role, including the stored hash.
    pub async fn authenticate(&self, table: &str, role: Role, email: &str) -> Result<Row, ExchangeError> {
        let exchange = Exchange::get(table)
            .with_get(AUTH_COLUMNS)
            .with_spec(&["email", "role", "active"])
            .with_row(Row {
                email: email.to_string(),
                role,
                active: true,
                ..Default::default()
            });
        self.run_single(exchange).await
    }

    /// [`authenticate`](Self::authenticate) plus a password check. Unknown
    /// email and wrong password are both `InvalidCredentials`.
    pub async fn verify_credentials(
        &self,
        table: &str,
        role: Role,
        email: &str,
        password: &str,
    ) -> Result<Row, ExchangeError> {
        let person = match self.authenticate(table, role, email).await {
            Err(ExchangeError::NotFound) => return Err(ExchangeError::InvalidCredentials),
            other => other?,
        };
        if !verify_off_runtime(&person.hashed_password, password).await? {
            return Err(ExchangeError::InvalidCredentials);
        }
        Ok(person)
    }

    pub async fn get_user(&self, table: &str, id: i64) -> Result<Row, ExchangeError> {
        let exchange = Exchange::get(table)
            .with_get(PROFILE_COLUMNS)
            .with_spec(&["id"])
            .with_row(Row { id, ..Default::default() });
        self.run_single(exchange).await
    }

    /// Create a person. The password is hashed here; the plaintext never
    /// goes on the wire.
    pub async fn insert_record(
        &self,
        table: &str,
        role: Role,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ExchangeError> {
        let exchange = Exchange::insert(table)
            .with_put(&["name", "email", "hashed_password", "created", "role"])
            .with_row(Row {
                name: name.to_string(),
                email: email.to_string(),
                hashed_password: hash_off_runtime(password).await?,
                role,
                ..Default::default()
            });
        self.run(exchange).await.map(|_| ())
    }

    pub async fn get_by_status(&self, table: &str, role: Role, active: bool) -> Result<Vec<Row>, ExchangeError> {
        let exchange = Exchange::get(table)
            .with_get(PROFILE_COLUMNS)
            .with_spec(&["role", "active"])
            .with_row(Row { role, active, ..Default::default() });
        Ok(self.run(exchange).await?.rows)
    }

    /// Activate or deactivate several people at once, given `(id, active)` pairs.
    pub async fn set_status(&self, table: &str, role: Role, changes: &[(i64, bool)]) -> Result<(), ExchangeError> {
        let rows = changes
            .iter()
            .map(|&(id, active)| Row { id, role, active, ..Default::default() })
            .collect();
        let exchange = Exchange::put(table)
            .with_put(&["active"])
            .with_spec(&["id", "role"])
            .with_rows(rows);
        self.run(exchange).await.map(|_| ())
    }

    pub async fn set_online(&self, table: &str, role: Role, id: i64, online: bool) -> Result<(), ExchangeError> {
        let exchange = Exchange::put(table)
            .with_put(&["online"])
            .with_spec(&["id", "role"])
            .with_row(Row { id, role, online, ..Default::default() });
        self.run(exchange).await.map(|_| ())
    }

    /// Replace the password of the person with this email and role. An email
    /// that matches nobody still reports success.
    pub async fn change_credential(
        &self,
        table: &str,
        role: Role,
        email: &str,
        password: &str,
    ) -> Result<(), ExchangeError> {
        let exchange = Exchange::put(table)
            .with_put(&["hashed_password"])
            .with_spec(&["email", "role"])
            .with_row(Row {
                hashed_password: hash_off_runtime(password).await?,
                email: email.to_string(),
                role,
                ..Default::default()
            });
        self.run(exchange).await.map(|_| ())
    }

    // -- Dialogs --

    /// Assign the least loaded agent. The returned row has `agent_id` and the
    /// agent's new `dialog_count`.
    pub async fn select_agent(&self) -> Result<Row, ExchangeError> {
        self.run_single(Exchange::agent_select()).await
    }

    /// Most recent dialog of a user.
    pub async fn get_dialog(&self, user_id: i64) -> Result<Row, ExchangeError> {
        let exchange = Exchange::get(tables::DIALOGS)
            .with_get(DIALOG_COLUMNS)
            .with_spec(&["user_id"])
            .with_row(Row { id: user_id, ..Default::default() });
        self.run(exchange)
            .await?
            .rows
            .into_iter()
            .max_by_key(|d| d.dialog_id)
            .ok_or(ExchangeError::NotFound)
    }

    pub async fn make_dialog(&self, user_id: i64, agent_id: i64) -> Result<(), ExchangeError> {
        let exchange = Exchange::insert(tables::DIALOGS)
            .with_put(&["user_id", "agent_id", "started"])
            .with_row(Row { id: user_id, agent_id, ..Default::default() });
        self.run(exchange).await.map(|_| ())
    }

    pub async fn add_agent_to_dialog(&self, dialog_id: i64, agent_id: i64) -> Result<(), ExchangeError> {
        let exchange = Exchange::put(tables::DIALOGS)
            .with_put(&["agent_id"])
            .with_spec(&["dialog_id"])
            .with_row(Row { dialog_id, agent_id, ..Default::default() });
        self.run(exchange).await.map(|_| ())
    }

    pub async fn enter_message(&self, dialog_id: i64, message: &str) -> Result<(), ExchangeError> {
        let exchange = Exchange::insert(tables::MESSAGES)
            .with_put(&["dialog_id", "created", "message"])
            .with_row(Row {
                dialog_id,
                message: message.to_string(),
                ..Default::default()
            });
        self.run(exchange).await.map(|_| ())
    }
}

/// Argon2 runs on the blocking pool, never on an async worker thread.
async fn hash_off_runtime(password: &str) -> Result<String, ExchangeError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || credentials::hash_password(&password))
        .await
        .map_err(|e| ExchangeError::failure(format!("hashing task failed: {}", e)))?
}

async fn verify_off_runtime(stored_hash: &str, password: &str) -> Result<bool, ExchangeError> {
    let (stored_hash, password) = (stored_hash.to_string(), password.to_string());
    tokio::task::spawn_blocking(move || credentials::verify_password(&stored_hash, &password))
        .await
        .map_err(|e| ExchangeError::failure(format!("hashing task failed: {}", e)))?
}
