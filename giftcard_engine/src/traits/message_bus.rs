use thiserror::Error;

/// The publishing half of the durable stream bus. The blocking consume loop lives on the concrete
/// [`StreamBus`](crate::bus::StreamBus); only publishing needs to be mockable, because the card
/// flow publishes funding and monitoring messages inline.
#[allow(async_fn_in_trait)]
pub trait MessageBus {
    /// Idempotently ensures the stream and consumer group exist.
    async fn declare(&self, stream: &str, group: &str) -> Result<(), BusError>;

    /// Appends a message to the stream, returning the server-assigned id. Streams are capped at an
    /// approximate maximum length to bound growth.
    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, BusError>;
}

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("Stream transport error: {0}")]
    Transport(String),
}
