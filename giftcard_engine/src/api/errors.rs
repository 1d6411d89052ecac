use thiserror::Error;

use crate::{
    bus::messages::MessageError,
    helpers::address::AddressError,
    traits::{BusError, CacheError, GiftCardDbError, NodeError, ProviderError},
};

/// The error surface of the card and treasury flows. Each variant corresponds to one of the codes
/// surfaced at the API edge; sensitive backend detail stays inside the message strings and is
/// logged, never returned to callers verbatim by the server layer.
#[derive(Debug, Clone, Error)]
pub enum CardFlowError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Node(#[from] NodeError),
    #[error("Transient backend error: {0}")]
    Transient(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GiftCardDbError> for CardFlowError {
    fn from(e: GiftCardDbError) -> Self {
        match e {
            GiftCardDbError::CodeExists => CardFlowError::Conflict("a card with this code already exists".to_string()),
            GiftCardDbError::Backend(msg) => CardFlowError::Transient(msg),
        }
    }
}

impl From<CacheError> for CardFlowError {
    fn from(e: CacheError) -> Self {
        CardFlowError::Transient(e.to_string())
    }
}

impl From<BusError> for CardFlowError {
    fn from(e: BusError) -> Self {
        CardFlowError::Transient(e.to_string())
    }
}

impl From<ProviderError> for CardFlowError {
    fn from(e: ProviderError) -> Self {
        match e {
            // A misconfigured provider name is an operator error, not a retryable condition.
            ProviderError::UnknownProvider(_) => CardFlowError::Internal(e.to_string()),
            _ => CardFlowError::Transient(e.to_string()),
        }
    }
}

impl From<AddressError> for CardFlowError {
    fn from(e: AddressError) -> Self {
        CardFlowError::InvalidArgument(e.to_string())
    }
}

impl From<MessageError> for CardFlowError {
    fn from(e: MessageError) -> Self {
        CardFlowError::InvalidArgument(e.to_string())
    }
}
