//! Gift Card Engine
//!
//! The core of a custodial Bitcoin gift-card backend. A buyer pays fiat, the platform issues a
//! redemption code backed by a balance claim against a pooled treasury (Lightning channels plus
//! an on-chain hot wallet), and the holder later spends that balance — fully or in fragments —
//! over Lightning or as an on-chain transfer. The platform holds the keys; cards are bookkeeping.
//!
//! The library is organised around capability seams:
//! 1. Storage. Cards and their transaction ledger live in Postgres behind the
//!    [`GiftCardDatabase`](traits::GiftCardDatabase) trait; [`PgDatabase`] is the concrete
//!    backend. Every state transition is a single guarded statement.
//! 2. Flows. [`CardFlowApi`] is the public API for issuance and redemption;
//!    [`TreasuryApi`](api::TreasuryApi) computes the pool's available balance and gates
//!    reservations behind a distributed lock.
//! 3. Plumbing. The [`bus`] module provides durable streams with consumer groups, ack and
//!    crash-recovery reclaim; [`cache`] the short-TTL cache and lock primitive; [`node`] the
//!    Lightning/on-chain node adapter; [`oracle`] the spot-price providers; and [`workers`] the
//!    funding and confirmation consumers.

pub mod api;
pub mod bus;
pub mod cache;
pub mod db_types;
pub mod helpers;
pub mod node;
pub mod oracle;
mod postgres;
pub mod traits;
pub mod workers;

pub use api::{CardFlowApi, CardFlowError};
pub use postgres::{db_url, new_pool, run_migrations, PgDatabase, PoolSettings};
