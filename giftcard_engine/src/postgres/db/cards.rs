use chrono::{DateTime, Utc};
use gc_common::Sats;
use log::debug;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db_types::{Card, CardCode},
    traits::GiftCardDbError,
};

/// Inserts a brand-new card. A unique violation on the code column surfaces as
/// [`GiftCardDbError::CodeExists`] so the caller can regenerate the code and retry.
pub async fn insert_card(card: Card, conn: &mut PgConnection) -> Result<Card, GiftCardDbError> {
    let card: Card = sqlx::query_as(
        r#"
            INSERT INTO cards (
                id,
                user_id,
                purchase_email,
                owner_email,
                code,
                btc_amount_sats,
                fiat_amount_cents,
                fiat_currency,
                purchase_price_cents,
                status,
                created_at,
                funded_at,
                redeemed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(card.id)
    .bind(card.user_id)
    .bind(card.purchase_email)
    .bind(card.owner_email)
    .bind(card.code)
    .bind(card.btc_amount_sats)
    .bind(card.fiat_amount_cents)
    .bind(card.fiat_currency)
    .bind(card.purchase_price_cents)
    .bind(card.status)
    .bind(card.created_at)
    .bind(card.funded_at)
    .bind(card.redeemed_at)
    .fetch_one(conn)
    .await?;
    debug!("📇️ Card [{}] inserted with id {}", card.code, card.id);
    Ok(card)
}

pub async fn fetch_card_by_code(code: &CardCode, conn: &mut PgConnection) -> Result<Option<Card>, sqlx::Error> {
    let card = sqlx::query_as("SELECT * FROM cards WHERE code = $1").bind(code.as_str()).fetch_optional(conn).await?;
    Ok(card)
}

pub async fn fetch_card_by_id(id: Uuid, conn: &mut PgConnection) -> Result<Option<Card>, sqlx::Error> {
    let card = sqlx::query_as("SELECT * FROM cards WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(card)
}

/// Returns all cards for the user, newest first.
pub async fn fetch_cards_for_user(user_id: &str, conn: &mut PgConnection) -> Result<Vec<Card>, sqlx::Error> {
    let cards = sqlx::query_as("SELECT * FROM cards WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(cards)
}

/// The `created → funding` transition. The status guard in the WHERE clause makes this the
/// funding worker's lease: exactly one worker wins the transition.
pub async fn begin_funding(id: Uuid, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE cards SET status = 'funding' WHERE id = $1 AND status = 'created'")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The `funding → active` transition: sets the reserved balance and stamps `funded_at`.
pub async fn activate_card(
    id: Uuid,
    amount: Sats,
    funded_at: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE cards SET status = 'active', btc_amount_sats = $2, funded_at = $3 \
         WHERE id = $1 AND status = 'funding'",
    )
    .bind(id)
    .bind(amount)
    .bind(funded_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// The `funding → created` revert, taken when treasury balance is insufficient.
pub async fn revert_to_created(id: Uuid, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE cards SET status = 'created' WHERE id = $1 AND status = 'funding'")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deducts `amount` from an active card in one guarded statement. When the balance lands on
/// exactly zero the card flips to `redeemed` and `redeemed_at` is stamped in the same statement.
/// Returns the updated card, or `None` if the card was not active or the balance was too small.
pub async fn debit_card(
    id: Uuid,
    amount: Sats,
    now: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<Option<Card>, sqlx::Error> {
    let card = sqlx::query_as(
        r#"
            UPDATE cards
            SET btc_amount_sats = btc_amount_sats - $2,
                status = CASE WHEN btc_amount_sats - $2 = 0 THEN 'redeemed'::card_status ELSE status END,
                redeemed_at = CASE WHEN btc_amount_sats - $2 = 0 THEN $3 ELSE redeemed_at END
            WHERE id = $1 AND status = 'active' AND btc_amount_sats >= $2
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(amount)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(card)
}

/// Sum of balances held by cards in `active` or `funding` state. This is the slice of treasury
/// already promised to card holders.
pub async fn total_reserved_balance(conn: &mut PgConnection) -> Result<Sats, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(btc_amount_sats), 0)::BIGINT FROM cards WHERE status IN ('active', 'funding')",
    )
    .fetch_one(conn)
    .await?;
    Ok(Sats::from(total))
}
