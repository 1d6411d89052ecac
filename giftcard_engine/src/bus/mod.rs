//! The durable stream bus: append-only streams with consumer groups over Redis streams.
//!
//! Delivery is at-least-once. A message is acknowledged only after its handler returns success;
//! anything else leaves it in the group's pending list, where a periodic reclaim step hands
//! messages idle for more than [`RECLAIM_MIN_IDLE_MS`] to a live consumer. Handlers therefore MUST
//! be idempotent: a worker that crashes mid-handle will have its message replayed elsewhere.

pub mod messages;

use std::future::Future;

use log::{debug, error, info, trace, warn};
use redis::{
    aio::ConnectionManager,
    streams::{StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply},
    AsyncCommands,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::traits::{BusError, MessageBus};

/// Stream carrying [`messages::FundCard`] payloads from card issuance to the funding workers.
pub const FUND_CARD_STREAM: &str = "fund_card";
pub const FUND_CARD_GROUP: &str = "fund_workers";
/// Stream carrying [`messages::MonitorTransaction`] payloads to the confirmation workers.
pub const MONITOR_TX_STREAM: &str = "monitor_tx";
pub const MONITOR_TX_GROUP: &str = "monitor_workers";
/// Permanently-invalid payloads are parked here before being acknowledged, so bad messages are
/// never silently lost.
pub const DEAD_LETTER_STREAM: &str = "dead_letter";

/// Approximate cap on stream length. Under overload the oldest entries age out; operators must
/// size their worker pools to keep the pending set small.
const MAX_STREAM_LEN: usize = 10_000;
const READ_COUNT: usize = 10;
const BLOCK_MS: usize = 5_000;
const RECLAIM_EVERY: u64 = 10;
const RECLAIM_MIN_IDLE_MS: usize = 5 * 60 * 1000;
const RECLAIM_BATCH: usize = 100;

/// Returned by consume-loop handlers. An error leaves the message pending for a later reclaim.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Clone)]
pub struct StreamBus {
    manager: ConnectionManager,
}

impl StreamBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Transport(e.to_string()))?;
        let manager = ConnectionManager::new(client).await.map_err(|e| BusError::Transport(e.to_string()))?;
        info!("📨️ Connected to the stream store");
        Ok(Self { manager })
    }

    /// Blocking consume loop. Reads batches of up to [`READ_COUNT`] new messages with a bounded
    /// block, dispatches each to `handler`, and acks on success. Every [`RECLAIM_EVERY`]
    /// iterations it also reclaims long-idle pending messages from dead consumers. Exits cleanly
    /// at the iteration after `cancel` fires.
    pub async fn consume<H, F>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cancel: CancellationToken,
        handler: H,
    ) -> Result<(), BusError>
    where
        H: Fn(String, Vec<u8>) -> F,
        F: Future<Output = Result<(), HandlerError>>,
    {
        let opts = StreamReadOptions::default().group(group, consumer).count(READ_COUNT).block(BLOCK_MS);
        let mut iteration: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!("📨️ Cancellation observed, stopping consumer {consumer} on {stream}");
                return Ok(());
            }
            iteration += 1;
            if iteration % RECLAIM_EVERY == 0 {
                if let Err(e) = self.reclaim_pending(stream, group, consumer, &handler).await {
                    error!("📨️ Could not reclaim pending messages on {stream}: {e}");
                }
            }
            match self.read_batch(stream, &opts).await {
                Ok(batch) => {
                    for msg in batch {
                        self.dispatch(stream, group, msg, &handler).await;
                    }
                },
                Err(e) => {
                    // Transport hiccups are logged and the loop carries on.
                    error!("📨️ Error reading from {stream}: {e}");
                },
            }
        }
    }

    async fn read_batch(&self, stream: &str, opts: &StreamReadOptions) -> Result<Vec<StreamId>, BusError> {
        let mut conn = self.manager.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[">"], opts)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let batch = reply.map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect()).unwrap_or_default();
        Ok(batch)
    }

    /// Atomically reassigns pending messages idle for more than [`RECLAIM_MIN_IDLE_MS`] from any
    /// other consumer to this one and reprocesses them. This is the crash-recovery path.
    async fn reclaim_pending<H, F>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        handler: &H,
    ) -> Result<(), BusError>
    where
        H: Fn(String, Vec<u8>) -> F,
        F: Future<Output = Result<(), HandlerError>>,
    {
        let mut conn = self.manager.clone();
        let opts = StreamAutoClaimOptions::default().count(RECLAIM_BATCH);
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(stream, group, consumer, RECLAIM_MIN_IDLE_MS, "0-0", opts)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        if !reply.claimed.is_empty() {
            warn!("📨️ Reclaimed {} idle pending messages on {stream} for {consumer}", reply.claimed.len());
        }
        for msg in reply.claimed {
            self.dispatch(stream, group, msg, handler).await;
        }
        Ok(())
    }

    async fn dispatch<H, F>(&self, stream: &str, group: &str, msg: StreamId, handler: &H)
    where
        H: Fn(String, Vec<u8>) -> F,
        F: Future<Output = Result<(), HandlerError>>,
    {
        let Some(data) = msg.get::<Vec<u8>>("data") else {
            error!("📨️ Message {} on {stream} is missing its data field. Acking and dropping it.", msg.id);
            self.ack(stream, group, &msg.id).await;
            return;
        };
        trace!("📨️ Processing message {} from {stream}", msg.id);
        match handler(msg.id.clone(), data).await {
            Ok(()) => {
                self.ack(stream, group, &msg.id).await;
                debug!("📨️ Message {} processed successfully", msg.id);
            },
            Err(e) => {
                // Left pending. It will be retried via the reclaim cycle.
                error!("📨️ Handler failed for message {} on {stream}: {e}", msg.id);
            },
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) {
        let mut conn = self.manager.clone();
        if let Err(e) = conn.xack::<_, _, _, i64>(stream, group, &[id]).await {
            error!("📨️ Could not ack message {id} on {stream}: {e}");
        }
    }
}

impl MessageBus for StreamBus {
    async fn declare(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        match conn.xgroup_create_mkstream::<_, _, _, String>(stream, group, "0").await {
            Ok(_) => {
                info!("📨️ Consumer group {group} created on {stream}");
                Ok(())
            },
            // BUSYGROUP means the group already exists. Declaring twice is not an error.
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("📨️ Consumer group {group} already exists on {stream}");
                Ok(())
            },
            Err(e) => Err(BusError::Transport(e.to_string())),
        }
    }

    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<String, BusError> {
        let mut conn = self.manager.clone();
        let id: String = conn
            .xadd_maxlen(stream, StreamMaxlen::Approx(MAX_STREAM_LEN), "*", &[("data", payload)])
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        debug!("📨️ Published message {id} to {stream}");
        Ok(id)
    }
}
