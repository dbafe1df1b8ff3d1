use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use toychat_types::ExchangeError;
use tracing::info;

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub payload: Bytes,
    /// Ephemeral subject the requester is waiting on, if it expects a reply.
    pub reply_to: Option<String>,
}

pub type Subscription = BoxStream<'static, Incoming>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("broker connection failed: {0}")]
    Connect(String),

    #[error("no responders on subject {0}")]
    NoResponders(String),

    #[error("request on {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("broker: {0}")]
    Broker(String),
}

impl From<TransportError> for ExchangeError {
    fn from(e: TransportError) -> Self {
        ExchangeError::Failure(e.to_string())
    }
}

/// Publish/subscribe broker with request/reply.
///
/// `request` publishes on `subject` with a broker-generated reply subject and
/// resolves with the first reply delivered there; later replies are dropped.
/// It does not time out on its own: callers bound it.
pub trait Transport: Clone + Send + Sync + 'static {
    fn request(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;

    fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn subscribe(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<Subscription, TransportError>> + Send;
}

/// NATS-backed transport. Holds one client connection for the life of the
/// service; clones share it.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    /// The client's own request timeout is disabled; request bounds are
    /// applied by [`ExchangeClient`](crate::ExchangeClient).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = async_nats::ConnectOptions::new()
            .request_timeout(None)
            .connect(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to NATS at {}", url);
        Ok(Self { client })
    }
}

impl Transport for NatsTransport {
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        use async_nats::RequestErrorKind;

        match self.client.request(subject.to_string(), payload).await {
            Ok(msg) => Ok(msg.payload),
            Err(e) => Err(match e.kind() {
                RequestErrorKind::NoResponders => TransportError::NoResponders(subject.to_string()),
                _ => TransportError::Broker(e.to_string()),
            }),
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))?;

        Ok(subscriber
            .map(|msg| Incoming {
                payload: msg.payload,
                reply_to: msg.reply.map(|s| s.to_string()),
            })
            .boxed())
    }
}
