use tracing::trace;

use crate::error::ExchangeError;
use crate::exchange::Exchange;

/// Serialize an exchange to MessagePack with named fields.
///
/// Every field of [`Exchange`] is serializable, so this only fails if the
/// encoder itself does.
pub fn encode(exchange: &Exchange) -> Result<Vec<u8>, ExchangeError> {
    let bytes = rmp_serde::to_vec_named(exchange)
        .map_err(|e| ExchangeError::failure(format!("envelope encode failed: {}", e)))?;
    trace!(len = bytes.len(), action = %exchange.action, "encoded envelope");
    Ok(bytes)
}

/// Deserialize an exchange. Anything that is not a complete envelope is
/// `MalformedEnvelope`.
pub fn decode(bytes: &[u8]) -> Result<Exchange, ExchangeError> {
    if bytes.is_empty() {
        return Err(ExchangeError::MalformedEnvelope("empty payload".into()));
    }
    rmp_serde::from_slice(bytes).map_err(|e| ExchangeError::MalformedEnvelope(e.to_string()))
}
