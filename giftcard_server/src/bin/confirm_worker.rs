//! The confirmation worker binary: tracks broadcast on-chain redemptions until they confirm.

use anyhow::Context;
use dotenvy::dotenv;
use giftcard_engine::{
    bus::{HandlerError, StreamBus, MONITOR_TX_GROUP, MONITOR_TX_STREAM},
    node,
    traits::MessageBus,
    workers::ConfirmationHandler,
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
    info!("🕰️ Starting confirmation worker...");

    let db = PgDatabase::new_with_url(&config.database.url(), &config.database.pool)
        .await
        .context("could not open the database pool")?;
    let bus = StreamBus::connect(&config.redis.url()).await.context("could not connect to the stream store")?;
    let node = node::connect(config.node.clone()).await.context("could not connect to the node")?;

    bus.declare(MONITOR_TX_STREAM, MONITOR_TX_GROUP).await.context("could not declare the consumer group")?;

    let handler = ConfirmationHandler::new(db, node, bus.clone(), config.confirmation_target);

    let consumer = format!("confirm-worker-{}", std::process::id());
    info!("🕰️ Confirmation worker {consumer} is running, waiting for messages on {MONITOR_TX_STREAM}");

    let cancel = CancellationToken::new();
    let consume = {
        let bus = bus.clone();
        let cancel = cancel.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            let result = bus
                .consume(MONITOR_TX_STREAM, MONITOR_TX_GROUP, &consumer, cancel, |id, data| {
                    let handler = &handler;
                    async move {
                        handler.process_message(&id, &data).await.map_err(|e| HandlerError::new(e.to_string()))
                    }
                })
                .await;
            if let Err(e) = result {
                error!("🕰️ Consumer error: {e}");
            }
        })
    };

    shutdown::wait_for_shutdown(cancel).await;
    consume.abort();
    info!("🕰️ Confirmation worker shut down gracefully");
    Ok(())
}
