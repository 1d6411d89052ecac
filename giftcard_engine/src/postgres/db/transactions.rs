use chrono::{DateTime, Utc};
use log::debug;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db_types::Transaction;

pub async fn insert_transaction(tx: Transaction, conn: &mut PgConnection) -> Result<Transaction, sqlx::Error> {
    let tx: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                id,
                card_id,
                type,
                redemption_method,
                tx_hash,
                payment_hash,
                payment_preimage,
                lightning_invoice,
                from_address,
                to_address,
                btc_amount_sats,
                status,
                confirmations,
                created_at,
                broadcast_at,
                confirmed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(tx.id)
    .bind(tx.card_id)
    .bind(tx.tx_type)
    .bind(tx.redemption_method)
    .bind(tx.tx_hash)
    .bind(tx.payment_hash)
    .bind(tx.payment_preimage)
    .bind(tx.lightning_invoice)
    .bind(tx.from_address)
    .bind(tx.to_address)
    .bind(tx.btc_amount_sats)
    .bind(tx.status)
    .bind(tx.confirmations)
    .bind(tx.created_at)
    .bind(tx.broadcast_at)
    .bind(tx.confirmed_at)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Transaction {} ({}) recorded for card {}", tx.id, tx.tx_type, tx.card_id);
    Ok(tx)
}

/// Whether a `fund` ledger entry already exists for the card. Used to keep funding replays from
/// double-recording the reservation.
pub async fn fund_transaction_exists(card_id: Uuid, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE card_id = $1 AND type = 'fund'")
            .bind(card_id)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn fetch_transaction(id: Uuid, conn: &mut PgConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_transaction_by_tx_hash(
    tx_hash: &str,
    conn: &mut PgConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE tx_hash = $1").bind(tx_hash).fetch_optional(conn).await?;
    Ok(tx)
}

/// Returns the card's ledger, oldest first.
pub async fn fetch_transactions_for_card(
    card_id: Uuid,
    conn: &mut PgConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM transactions WHERE card_id = $1 ORDER BY created_at ASC")
        .bind(card_id)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

/// Settles a pending Lightning redeem with its preimage. The `status = 'pending'` guard keeps
/// terminal rows immutable.
pub async fn settle_lightning_redeem(
    id: Uuid,
    preimage: &str,
    now: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions \
         SET status = 'confirmed', payment_preimage = $2, broadcast_at = COALESCE(broadcast_at, $3), confirmed_at = $3 \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(preimage)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Records the broadcast of a pending on-chain redeem. The row stays `pending`; the confirmation
/// worker flips it once the chain has seen enough blocks.
pub async fn mark_broadcast(
    id: Uuid,
    tx_hash: &str,
    now: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions SET tx_hash = $2, broadcast_at = $3 WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(tx_hash)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_transaction_failed(id: Uuid, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE transactions SET status = 'failed' WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_confirmations(id: Uuid, confirmations: i32, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE transactions SET confirmations = $2 WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .bind(confirmations)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn confirm_transaction(
    id: Uuid,
    confirmations: i32,
    now: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions SET status = 'confirmed', confirmations = $2, confirmed_at = $3 \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(confirmations)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Pending Lightning redeems created before the cutoff. These are candidates for settlement-state
/// reconciliation against the node after a crash between payment and record-keeping.
pub async fn fetch_stale_pending_lightning(
    cutoff: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let txs = sqlx::query_as(
        "SELECT * FROM transactions \
         WHERE type = 'redeem' AND redemption_method = 'lightning' AND status = 'pending' AND created_at <= $1 \
         ORDER BY created_at ASC",
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}
