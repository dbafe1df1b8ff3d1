//! Request/reply plumbing between toychat services and the storage manager.
//!
//! - [`transport`]: the broker seam, with a NATS implementation
//! - [`memory`]: an in-process broker with the same semantics
//! - [`dispatcher`]: storage side, turns inbound exchanges into database calls
//! - [`client`]: caller side, one method per logical operation

pub mod client;
pub mod credentials;
pub mod dispatcher;
pub mod memory;
pub mod transport;

pub use client::{ClientConfig, ExchangeClient};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use memory::MemoryBroker;
pub use transport::{Incoming, NatsTransport, Subscription, Transport, TransportError};
