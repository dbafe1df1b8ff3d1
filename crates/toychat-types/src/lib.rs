pub mod codec;
pub mod error;
pub mod exchange;
pub mod models;
pub mod tables;

pub use codec::{decode, encode};
pub use error::{ErrorKind, ExchangeError};
pub use exchange::{Action, Exchange, UnknownAction};
pub use models::{Role, Row};
