use std::sync::Arc;

use futures_util::StreamExt;
use toychat_db::Database;
use toychat_db::queries::DEFAULT_AGENT_CAPACITY;
use toychat_types::{Action, Exchange, ExchangeError, Row, codec};
use tracing::{debug, error, info, warn};

use crate::transport::{Incoming, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Subject the storage manager listens on.
    pub subject: String,
    /// Ceiling on open dialogs per agent for agent selection.
    pub agent_capacity: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            subject: "forDB".into(),
            agent_capacity: DEFAULT_AGENT_CAPACITY,
        }
    }
}

/// Storage-side end of the exchange protocol.
///
/// Every inbound message is handled on its own task and shares nothing with
/// other messages except the database pool. Storage calls run on the
/// blocking pool so a slow query never stalls the receive loop.
pub struct Dispatcher<T: Transport> {
    transport: T,
    db: Arc<Database>,
    config: Arc<DispatcherConfig>,
}

impl<T: Transport> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            db: Arc::clone(&self.db),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, db: Arc<Database>, config: DispatcherConfig) -> Self {
        Self {
            transport,
            db,
            config: Arc::new(config),
        }
    }

    /// Receive loop. Returns when the subscription ends.
    pub async fn run(self) -> Result<(), TransportError> {
        let mut inbound = self.transport.subscribe(&self.config.subject).await?;
        info!("Dispatcher listening on {}", self.config.subject);

        while let Some(msg) = inbound.next().await {
            let this = self.clone();
            tokio::spawn(async move { this.handle(msg).await });
        }

        info!("Subscription on {} closed, dispatcher stopping", self.config.subject);
        Ok(())
    }

    async fn handle(&self, msg: Incoming) {
        let Some(reply_to) = msg.reply_to else {
            warn!("Dropping request without a reply subject");
            return;
        };

        let reply = self.process(&msg.payload).await;
        let bytes = match codec::encode(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode reply: {}", e);
                return;
            }
        };

        if let Err(e) = self.transport.publish(&reply_to, bytes.into()).await {
            warn!("Failed to send reply to {}: {}", reply_to, e);
        }
    }

    /// Decode one request, execute it, and build the reply envelope.
    pub async fn process(&self, payload: &[u8]) -> Exchange {
        let request = match codec::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting undecodable request: {}", e);
                let detail = match e {
                    ExchangeError::MalformedEnvelope(detail) => detail,
                    other => other.to_string(),
                };
                return Exchange::malformed(detail);
            }
        };

        let table = request.table.clone();
        let action = request.action.clone();
        debug!(%table, %action, rows = request.rows.len(), "request");

        let db = Arc::clone(&self.db);
        let capacity = self.config.agent_capacity;
        let reply = tokio::task::spawn_blocking(move || {
            let outcome = execute(&db, &request, capacity);
            request.into_reply(outcome)
        })
        .await;

        match reply {
            Ok(reply) => {
                if let Err(e) = reply.outcome() {
                    if e.is_negative_outcome() {
                        debug!(%table, %action, "{}", e);
                    } else {
                        warn!(%table, %action, "{}", e);
                    }
                }
                reply
            }
            Err(e) => {
                error!(%table, %action, "Storage task failed: {}", e);
                Exchange::new(table, action)
                    .into_reply(Err(ExchangeError::failure("storage task failed")))
            }
        }
    }
}

fn execute(db: &Database, request: &Exchange, capacity: i64) -> Result<Vec<Row>, ExchangeError> {
    let table = request.table.as_str();
    match &request.action {
        Action::Insert => {
            db.insert_rows(table, request.put.as_slice(), &request.rows)?;
            Ok(Vec::new())
        }
        Action::Get => Ok(db.get_rows(
            table,
            request.get.as_slice(),
            request.spec.as_slice(),
            &request.rows,
        )?),
        Action::Put => {
            let affected = db.put_rows(table, request.put.as_slice(), request.spec.as_slice(), &request.rows)?;
            if affected == 0 {
                debug!(table, "put matched no rows");
            }
            Ok(Vec::new())
        }
        Action::AgentSelect => Ok(vec![db.select_agent(capacity)?]),
        Action::Other(name) => {
            debug!(table, action = %name, "unsupported action");
            Err(ExchangeError::failure("action not supported"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tempfile::TempDir;
    use toychat_db::DbConfig;
    use toychat_types::{ErrorKind, Role, tables};

    use super::*;
    use crate::memory::MemoryBroker;

    fn setup() -> (TempDir, Dispatcher<MemoryBroker>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("toychat.db"), &DbConfig::default()).unwrap();
        let dispatcher = Dispatcher::new(MemoryBroker::new(), Arc::new(db), DispatcherConfig::default());
        (dir, dispatcher)
    }

    async fn roundtrip(dispatcher: &Dispatcher<MemoryBroker>, request: Exchange) -> Exchange {
        dispatcher.process(&codec::encode(&request).unwrap()).await
    }

    fn agent(email: &str) -> Row {
        Row {
            name: "Agent".into(),
            email: email.into(),
            role: Role::Agent,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn garbage_gets_malformed_reply() {
        let (_dir, dispatcher) = setup();
        let reply = dispatcher.process(b"\xc1\xc1 definitely not msgpack").await;
        assert_eq!(reply.err_kind, ErrorKind::MalformedEnvelope);
        assert!(reply.rows.is_empty());
    }

    #[tokio::test]
    async fn unknown_action_is_generic_failure() {
        let (_dir, dispatcher) = setup();
        let request = Exchange::new(tables::USERS, Action::from("truncate"));
        let reply = roundtrip(&dispatcher, request).await;
        assert_eq!(reply.err_kind, ErrorKind::GenericFailure);
        assert_eq!(reply.err, "action not supported");
    }

    #[tokio::test]
    async fn insert_get_put_cycle() {
        let (_dir, dispatcher) = setup();

        let insert = Exchange::insert(tables::ADMINS)
            .with_put(&["name", "email", "created", "role"])
            .with_row(agent("a@x.com"));
        assert!(roundtrip(&dispatcher, insert.clone()).await.outcome().is_ok());
        assert_eq!(roundtrip(&dispatcher, insert).await.err_kind, ErrorKind::DuplicateKey);

        let put = Exchange::put(tables::ADMINS)
            .with_put(&["online"])
            .with_spec(&["email", "role"])
            .with_row(Row { online: true, ..agent("a@x.com") });
        let reply = roundtrip(&dispatcher, put).await;
        assert!(reply.outcome().is_ok());
        assert!(reply.rows.is_empty());

        let get = Exchange::get(tables::ADMINS)
            .with_get(&["email", "online", "created"])
            .with_spec(&["online"])
            .with_row(Row { online: true, ..Default::default() });
        let reply = roundtrip(&dispatcher, get).await;
        assert!(reply.outcome().is_ok());
        assert_eq!(reply.rows.len(), 1);
        assert_eq!(reply.rows[0].email, "a@x.com");
        assert!(reply.rows[0].created.is_some());
    }

    #[tokio::test]
    async fn get_without_match_is_not_found_and_empty() {
        let (_dir, dispatcher) = setup();
        let get = Exchange::get(tables::USERS)
            .with_get(&["id"])
            .with_spec(&["email"])
            .with_row(Row { email: "nobody@x.com".into(), ..Default::default() });
        let reply = roundtrip(&dispatcher, get).await;
        assert_eq!(reply.err_kind, ErrorKind::NotFound);
        assert!(reply.rows.is_empty());
    }

    #[tokio::test]
    async fn missing_filter_never_reaches_storage() {
        let (_dir, dispatcher) = setup();
        let put = Exchange::put(tables::USERS)
            .with_put(&["active"])
            .with_row(Row::default());
        let reply = roundtrip(&dispatcher, put).await;
        assert_eq!(reply.err_kind, ErrorKind::GenericFailure);
        assert!(reply.err.contains("WHERE"));
    }

    #[tokio::test]
    async fn schema_violation_is_generic_failure() {
        let (_dir, dispatcher) = setup();
        let get = Exchange::get(tables::USERS)
            .with_get(&["password"])
            .with_spec(&["email"])
            .with_row(Row::default());
        let reply = roundtrip(&dispatcher, get).await;
        assert_eq!(reply.err_kind, ErrorKind::GenericFailure);
    }

    #[tokio::test]
    async fn agent_select_without_agents_is_not_found() {
        let (_dir, dispatcher) = setup();
        let reply = roundtrip(&dispatcher, Exchange::agent_select()).await;
        assert_eq!(reply.err_kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn run_replies_over_the_broker() {
        let (_dir, dispatcher) = setup();
        let broker = dispatcher.transport.clone();
        tokio::spawn(dispatcher.run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let reply = broker.request("forDB", Bytes::from_static(b"junk")).await.unwrap();
        let reply = codec::decode(&reply).unwrap();
        assert_eq!(reply.err_kind, ErrorKind::MalformedEnvelope);
    }

    #[tokio::test]
    async fn failed_agent_transaction_is_generic_failure() {
        let (_dir, dispatcher) = setup();
        let insert = Exchange::insert(tables::ADMINS)
            .with_put(&["name", "email", "created", "role"])
            .with_row(agent("a@x.com"));
        assert!(roundtrip(&dispatcher, insert).await.outcome().is_ok());
        dispatcher
            .db
            .with_conn(|conn| {
                Ok(conn.execute_batch(
                    "CREATE TRIGGER freeze_load BEFORE UPDATE OF dialog_count ON admins
                     BEGIN SELECT RAISE(ABORT, 'load frozen'); END;",
                )?)
            })
            .unwrap();

        let reply = roundtrip(&dispatcher, Exchange::agent_select()).await;
        assert_eq!(reply.err_kind, ErrorKind::GenericFailure);
        assert!(reply.rows.is_empty());

        let get = Exchange::get(tables::ADMINS)
            .with_get(&["dialog_count"])
            .with_spec(&["email"])
            .with_row(agent("a@x.com"));
        assert_eq!(roundtrip(&dispatcher, get).await.rows[0].dialog_count, 0);
    }

    #[tokio::test]
    async fn request_without_reply_subject_is_dropped() {
        let (_dir, dispatcher) = setup();
        let broker = dispatcher.transport.clone();
        let db = Arc::clone(&dispatcher.db);
        tokio::spawn(dispatcher.run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let insert = Exchange::insert(tables::ADMINS)
            .with_put(&["name", "email", "created", "role"])
            .with_row(agent("a@x.com"));
        broker
            .publish("forDB", codec::encode(&insert).unwrap().into())
            .await
            .unwrap();

        // A later request on the same subject is still answered.
        let reply = broker
            .request("forDB", codec::encode(&Exchange::agent_select()).unwrap().into())
            .await
            .unwrap();
        assert_eq!(codec::decode(&reply).unwrap().err_kind, ErrorKind::NotFound);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let filter = Row { email: "a@x.com".into(), ..Default::default() };
        let err = db.get_rows(tables::ADMINS, &["id"], &["email"], &[filter]).unwrap_err();
        assert!(matches!(err, toychat_db::DbError::NotFound));
    }
}
