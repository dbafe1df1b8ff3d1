use serde::{Deserialize, Serialize};

/// Integer tag for the error carried in a reply envelope.
///
/// Error values cannot cross serialization, so replies carry this tag plus a
/// free-text detail. Callers branch on the kind only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ErrorKind {
    #[default]
    None = 0,
    GenericFailure = 1,
    NotFound = 2,
    InvalidCredentials = 3,
    DuplicateKey = 4,
    MalformedEnvelope = 5,
}

impl From<ErrorKind> for u8 {
    fn from(kind: ErrorKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for ErrorKind {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::GenericFailure),
            2 => Ok(Self::NotFound),
            3 => Ok(Self::InvalidCredentials),
            4 => Ok(Self::DuplicateKey),
            5 => Ok(Self::MalformedEnvelope),
            other => Err(format!("unknown error kind tag {}", other)),
        }
    }
}

/// The closed set of failures an exchange can report across the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("no matching record found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("duplicate email")]
    DuplicateKey,

    #[error("{0}")]
    Failure(String),
}

impl ExchangeError {
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure(detail.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::DuplicateKey => ErrorKind::DuplicateKey,
            Self::Failure(_) => ErrorKind::GenericFailure,
        }
    }

    /// Rebuild the error from its wire form. `ErrorKind::None` means success.
    pub fn from_wire(kind: ErrorKind, detail: &str) -> Option<Self> {
        match kind {
            ErrorKind::None => None,
            ErrorKind::GenericFailure => Some(Self::Failure(detail.to_string())),
            ErrorKind::NotFound => Some(Self::NotFound),
            ErrorKind::InvalidCredentials => Some(Self::InvalidCredentials),
            ErrorKind::DuplicateKey => Some(Self::DuplicateKey),
            ErrorKind::MalformedEnvelope => Some(Self::MalformedEnvelope(detail.to_string())),
        }
    }

    /// NotFound and InvalidCredentials are ordinary negative answers; the rest
    /// are unexpected and worth logging.
    pub fn is_negative_outcome(&self) -> bool {
        matches!(self, Self::NotFound | Self::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_survives_the_wire() {
        let errors = [
            ExchangeError::MalformedEnvelope("truncated".into()),
            ExchangeError::NotFound,
            ExchangeError::InvalidCredentials,
            ExchangeError::DuplicateKey,
            ExchangeError::Failure("disk full".into()),
        ];
        for err in errors {
            let tag: u8 = err.kind().into();
            let kind = ErrorKind::try_from(tag).unwrap();
            let detail = err.to_string();
            let back = ExchangeError::from_wire(kind, &detail).unwrap();
            assert_eq!(back.kind(), err.kind());
        }
    }

    #[test]
    fn none_is_success() {
        assert!(ExchangeError::from_wire(ErrorKind::None, "ignored").is_none());
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(ErrorKind::try_from(42).is_err());
    }
}
