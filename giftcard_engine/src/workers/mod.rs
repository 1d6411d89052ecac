//! Stream-consumer handlers.
//!
//! Each handler processes one message at a time and encodes the ack/retry contract in its return
//! value: `Ok` acknowledges the message, an error leaves it pending for the bus's reclaim cycle.
//! Permanently-bad payloads are parked on the dead-letter stream before being acknowledged, so
//! they are never silently lost. Delivery is at-least-once, so every handler is idempotent.

mod confirmations;
mod funding;

pub use confirmations::{ConfirmationHandler, DEFAULT_CONFIRMATION_TARGET, DEFAULT_GIVE_UP_HOURS};
pub use funding::{compute_satoshis, FundingHandler};
