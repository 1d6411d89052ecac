//! Request handler definitions.
//!
//! Handlers stay thin: deserialize, call into [`CardFlowApi`], map the result. Anything more than
//! a few lines belongs in the engine.

use std::{sync::Arc, time::Duration};

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use giftcard_engine::{
    api::{CreateCardRequest, RedeemRequest},
    bus::StreamBus,
    cache::{within_rate_limit, RedisCache},
    db_types::CardStatus,
    node::LndNode,
    traits::NodeClient,
    CardFlowApi, PgDatabase,
};
use log::*;

use crate::{
    data_objects::{BalanceResponse, HealthResponse, RedeemBody, TreasuryResponse, ValidateResponse},
    errors::ServerError,
};

pub type Backend = CardFlowApi<PgDatabase, LndNode, RedisCache, StreamBus>;

/// Redemptions per source IP per minute.
const REDEEM_RATE_LIMIT: i64 = 10;
const REDEEM_RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<Backend>,
    pub cache: RedisCache,
    pub db: PgDatabase,
    pub node: LndNode,
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    trace!("💻️ Received health check request");
    let database = state.db.ping().await.is_ok();
    let cache = state.cache.ping().await.is_ok();
    let node = state.node.node_info().await.ok();
    let healthy = database && cache && node.as_ref().map(|n| n.synced_to_chain).unwrap_or(false);
    let body = HealthResponse { database, cache, node };
    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

// ----------------------------------------------   Cards   ----------------------------------------------------
#[post("/api/cards")]
pub async fn create_card(
    state: web::Data<AppState>,
    body: web::Json<CreateCardRequest>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    debug!("💻️ POST create_card for {} {} cents", req.fiat_amount_cents, req.fiat_currency);
    let response = state.api.create_card(req).await?;
    Ok(HttpResponse::Created().json(response))
}

#[get("/api/cards/{code}")]
pub async fn get_card(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET card {code}");
    let card = state.api.get_by_code(&code).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[get("/api/cards/{code}/balance")]
pub async fn card_balance(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET balance for {code}");
    let balance = state.api.get_balance(&code).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse { code, btc_amount_sats: balance }))
}

#[get("/api/cards/{code}/validate")]
pub async fn validate_card(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET validate for {code}");
    let status = state.api.validate_code(&code).await?;
    Ok(HttpResponse::Ok().json(ValidateResponse { code, spendable: status == CardStatus::Active, status }))
}

#[get("/api/cards/{code}/transactions")]
pub async fn card_transactions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET transactions for {code}");
    let ledger = state.api.card_transactions(&code).await?;
    Ok(HttpResponse::Ok().json(ledger))
}

#[get("/api/users/{user_id}/cards")]
pub async fn user_cards(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET cards for user {user_id}");
    let cards = state.api.cards_for_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(cards))
}

#[get("/api/transactions/{id}")]
pub async fn get_transaction(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET transaction {id}");
    let tx = state.api.get_transaction(id).await?;
    Ok(HttpResponse::Ok().json(tx))
}

// --------------------------------------------   Treasury  ----------------------------------------------------
#[get("/api/treasury")]
pub async fn treasury_status(state: web::Data<AppState>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET treasury status");
    let available = state.api.treasury().available_balance().await?;
    let deposit_address = state.api.deposit_address().await?;
    Ok(HttpResponse::Ok().json(TreasuryResponse { available_sats: available, deposit_address }))
}

#[post("/api/cards/{code}/redeem")]
pub async fn redeem_card(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RedeemBody>,
) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    let body = body.into_inner();
    debug!("💻️ POST redeem {} sats from {code} via {}", body.amount_sats.value(), body.method);

    let ip = req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string());
    let allowed = within_rate_limit(&state.cache, &format!("rate:redeem:{ip}"), REDEEM_RATE_LIMIT, REDEEM_RATE_WINDOW)
        .await
        // A broken rate limiter must not take redemption down with it.
        .unwrap_or(true);
    if !allowed {
        warn!("💻️ Rate limit hit for {ip} on redeem");
        return Err(ServerError::RateLimited);
    }

    let response = state
        .api
        .redeem_card(RedeemRequest {
            code,
            method: body.method,
            amount_sats: body.amount_sats,
            destination_address: body.destination_address,
            lightning_invoice: body.lightning_invoice,
        })
        .await?;
    Ok(HttpResponse::Ok().json(response))
}
