//! The capability seams of the engine.
//!
//! Every external collaborator — the relational store, the cache/lock store, the stream bus, the
//! Lightning node and the price oracle — sits behind a trait defined here, so the card flow,
//! treasury engine and workers can be exercised against test doubles. Concrete implementations
//! live in the [`postgres`](crate::postgres), [`cache`](crate::cache), [`bus`](crate::bus),
//! [`node`](crate::node) and [`oracle`](crate::oracle) modules.

mod data_objects;
mod giftcard_database;
mod key_value_cache;
mod message_bus;
mod node_client;
mod price_oracle;

pub use data_objects::{
    ChannelBalance, Invoice, NodeInfo, OnChainSend, OnChainTx, PaymentOutcome, PaymentResult, WalletBalance,
};
pub use giftcard_database::{GiftCardDatabase, GiftCardDbError};
pub use key_value_cache::{CacheError, KeyValueCache};
pub use message_bus::{BusError, MessageBus};
pub use node_client::{NodeClient, NodeError};
pub use price_oracle::{PriceOracle, ProviderError};
