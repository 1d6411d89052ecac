//! The funding worker binary: consumes `FundCard` messages and activates cards.
//!
//! Funding is pure accounting. BTC is pre-purchased over the counter and held in the treasury
//! (Lightning channels plus the on-chain hot wallet); this worker prices each card's fiat face
//! value, checks the treasury has headroom under the reservation lock, and reserves the balance.
//! No transaction is broadcast and no keys are generated.

use anyhow::Context;
use dotenvy::dotenv;
use giftcard_engine::{
    api::TreasuryApi,
    bus::{HandlerError, StreamBus, FUND_CARD_GROUP, FUND_CARD_STREAM},
    cache::RedisCache,
    node,
    oracle::PriceProvider,
    traits::MessageBus,
    workers::FundingHandler,
    PgDatabase,
};
use giftcard_server::{config::ServerConfig, shutdown};
use log::{error, info};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("⚙️ Starting funding worker...");

    let db = PgDatabase::new_with_url(&config.database.url(), &config.database.pool)
        .await
        .context("could not open the database pool")?;
    let redis_url = config.redis.url();
    let cache = RedisCache::connect(&redis_url).await.context("could not connect to the cache store")?;
    let bus = StreamBus::connect(&redis_url).await.context("could not connect to the stream store")?;
    let node = node::connect(config.node.clone()).await.context("could not connect to the node")?;
    // The cost-basis provider is preferred; the other adapters act as configured fallbacks.
    let oracle = PriceProvider::by_name(&config.oracle_provider, None, None)?;

    bus.declare(FUND_CARD_STREAM, FUND_CARD_GROUP).await.context("could not declare the consumer group")?;

    let treasury = TreasuryApi::new(db.clone(), node, cache);
    let handler = FundingHandler::new(db, treasury, oracle, bus.clone());

    let consumer = format!("fund-worker-{}", std::process::id());
    info!("⚙️ Funding worker {consumer} is running, waiting for messages on {FUND_CARD_STREAM}");

    let cancel = CancellationToken::new();
    let consume = {
        let bus = bus.clone();
        let cancel = cancel.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            let result = bus
                .consume(FUND_CARD_STREAM, FUND_CARD_GROUP, &consumer, cancel, |id, data| {
                    let handler = &handler;
                    async move {
                        handler.process_message(&id, &data).await.map_err(|e| HandlerError::new(e.to_string()))
                    }
                })
                .await;
            if let Err(e) = result {
                error!("⚙️ Consumer error: {e}");
            }
        })
    };

    shutdown::wait_for_shutdown(cancel).await;
    consume.abort();
    info!("⚙️ Funding worker shut down gracefully");
    Ok(())
}
