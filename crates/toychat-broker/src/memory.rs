use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::transport::{Incoming, Subscription, Transport, TransportError};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<Incoming>>>;

/// In-process broker with NATS-like request/reply semantics.
///
/// Every subscriber of a subject receives each message published on it.
/// Requests get a fresh `_INBOX.<uuid>` reply subject that is torn down as
/// soon as the first reply arrives or the requester stops waiting.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    subjects: Arc<Mutex<Subscribers>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Subscribers>, TransportError> {
        self.subjects
            .lock()
            .map_err(|e| TransportError::Broker(format!("subscriber table poisoned: {}", e)))
    }

    fn register(&self, subject: &str) -> Result<mpsc::UnboundedReceiver<Incoming>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()?.entry(subject.to_string()).or_default().push(tx);
        Ok(rx)
    }

    /// Deliver to live subscribers. Returns how many received it.
    fn deliver(&self, subject: &str, msg: Incoming) -> Result<usize, TransportError> {
        let mut subjects = self.lock()?;
        let Some(subscribers) = subjects.get_mut(subject) else {
            return Ok(0);
        };
        subscribers.retain(|tx| !tx.is_closed());
        let delivered = subscribers.iter().filter(|tx| tx.send(msg.clone()).is_ok()).count();
        if subscribers.is_empty() {
            subjects.remove(subject);
        }
        Ok(delivered)
    }
}

/// Removes a request's reply subject when the request finishes or is dropped.
struct InboxGuard {
    broker: MemoryBroker,
    inbox: String,
}

impl Drop for InboxGuard {
    fn drop(&mut self) {
        if let Ok(mut subjects) = self.broker.subjects.lock() {
            subjects.remove(&self.inbox);
        }
    }
}

impl Transport for MemoryBroker {
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut replies = self.register(&inbox)?;
        let _guard = InboxGuard {
            broker: self.clone(),
            inbox: inbox.clone(),
        };

        let msg = Incoming {
            payload,
            reply_to: Some(inbox),
        };
        if self.deliver(subject, msg)? == 0 {
            return Err(TransportError::NoResponders(subject.to_string()));
        }

        match replies.recv().await {
            Some(reply) => Ok(reply.payload),
            None => Err(TransportError::Broker("reply subject closed".into())),
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        let delivered = self.deliver(subject, Incoming { payload, reply_to: None })?;
        trace!(subject, delivered, "published");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let rx = self.register(subject)?;
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|msg| (msg, rx)) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Answer every request on `subject` with `answers`, one publish each.
    async fn responder(broker: &MemoryBroker, subject: &str, answers: &'static [&'static str]) {
        let mut inbound = broker.subscribe(subject).await.unwrap();
        let broker = broker.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound.next().await {
                let Some(reply_to) = msg.reply_to else { continue };
                for answer in answers {
                    broker.publish(&reply_to, Bytes::from_static(answer.as_bytes())).await.unwrap();
                }
            }
        });
    }

    #[tokio::test]
    async fn request_gets_reply() {
        let broker = MemoryBroker::new();
        responder(&broker, "forChat", &["olleh"]).await;
        let reply = broker.request("forChat", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(&reply[..], b"olleh");
    }

    #[tokio::test]
    async fn only_first_reply_is_accepted() {
        let broker = MemoryBroker::new();
        responder(&broker, "forDB", &["first", "second"]).await;

        let reply = broker.request("forDB", Bytes::new()).await.unwrap();
        assert_eq!(&reply[..], b"first");

        // The reply subject is gone, so a follow-up request sees only its own answer.
        let again = broker.request("forDB", Bytes::new()).await.unwrap();
        assert_eq!(&again[..], b"first");
    }

    #[tokio::test]
    async fn no_subscriber_means_no_responders() {
        let broker = MemoryBroker::new();
        let err = broker.request("nobody", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::NoResponders(_)));
    }

    #[tokio::test]
    async fn abandoned_request_releases_its_inbox() {
        let broker = MemoryBroker::new();
        let _silent = broker.subscribe("forDB").await.unwrap();

        let pending = broker.request("forDB", Bytes::new());
        assert!(tokio::time::timeout(Duration::from_millis(20), pending).await.is_err());

        let subjects = broker.subjects.lock().unwrap();
        assert!(subjects.keys().all(|s| !s.starts_with("_INBOX.")));
    }
}
