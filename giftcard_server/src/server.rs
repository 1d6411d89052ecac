use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use giftcard_engine::{
    api::TreasuryApi,
    bus::{StreamBus, FUND_CARD_STREAM, FUND_CARD_GROUP, MONITOR_TX_STREAM, MONITOR_TX_GROUP},
    cache::RedisCache,
    node,
    run_migrations,
    traits::MessageBus,
    CardFlowApi,
    PgDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    routes::{self, AppState},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let state = build_state(&config).await?;
    let srv = create_server_instance(&config, state)?;
    srv.await.map_err(ServerError::from)
}

/// Wires up every backend the API needs, failing fast on any of them: database (with
/// migrations), cache, stream bus (declaring the consumer groups), and the node handshake.
/// Finishes with the startup reconciliation sweep over stale pending Lightning redeems.
pub async fn build_state(config: &ServerConfig) -> Result<AppState, ServerError> {
    let db = PgDatabase::new_with_url(&config.database.url(), &config.database.pool)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    run_migrations(db.pool()).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let redis_url = config.redis.url();
    let cache = RedisCache::connect(&redis_url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let bus = StreamBus::connect(&redis_url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    bus.declare(FUND_CARD_STREAM, FUND_CARD_GROUP)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    bus.declare(MONITOR_TX_STREAM, MONITOR_TX_GROUP)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let node = node::connect(config.node.clone()).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let treasury = TreasuryApi::new(db.clone(), node.clone(), cache.clone());
    let api = CardFlowApi::new(
        db.clone(),
        node.clone(),
        cache.clone(),
        bus,
        treasury,
        config.node.network,
        config.node.max_payment_fee_sats,
    );

    match api.reconcile_pending_lightning(chrono::Duration::minutes(10)).await {
        Ok(0) => {},
        Ok(n) => warn!("💻️ Startup reconciliation resolved {n} stale pending Lightning redeems"),
        Err(e) => warn!("💻️ Startup reconciliation failed: {e}"),
    }

    Ok(AppState { api: Arc::new(api), cache, db, node })
}

pub fn create_server_instance(config: &ServerConfig, state: AppState) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U"))
            .app_data(web::Data::new(state.clone()))
            .service(routes::health)
            .service(routes::create_card)
            .service(routes::get_card)
            .service(routes::card_balance)
            .service(routes::validate_card)
            .service(routes::card_transactions)
            .service(routes::user_cards)
            .service(routes::get_transaction)
            .service(routes::treasury_status)
            .service(routes::redeem_card)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
