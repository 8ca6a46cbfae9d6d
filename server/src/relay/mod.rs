//! Business message relay.
//!
//! Submitted messages are coalesced per protocol and user; a tick-driven
//! flush loop takes each protocol's pending table and broadcasts it as one
//! JSON object to every connection registered under that protocol.

pub mod pending;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cmdrelay_sdk::{BusinessMessage, Protocol};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::metrics::RelayMetrics;
use crate::registry::ConnectionRegistry;

pub use pending::PendingTable;

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Protocol flushed.
    pub protocol: Protocol,
    /// Users in the broadcast; zero when nothing was pending.
    pub users: usize,
    /// Connections the broadcast was queued to.
    pub delivered: usize,
    /// Connections that failed and were closed.
    pub failed: usize,
}

impl FlushReport {
    const fn empty(protocol: Protocol) -> Self {
        Self {
            protocol,
            users: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

#[derive(Debug)]
struct Lane {
    pending: PendingTable,
    registry: Arc<ConnectionRegistry>,
}

/// Coalesces submitted messages and broadcasts them per protocol.
#[derive(Debug)]
pub struct BusinessRelay {
    socket: Lane,
    websocket: Lane,
    flush_interval: Duration,
    write_timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

impl BusinessRelay {
    /// Creates a relay over the two transport registries.
    #[must_use]
    pub fn new(
        socket_registry: Arc<ConnectionRegistry>,
        websocket_registry: Arc<ConnectionRegistry>,
        flush_interval: Duration,
        write_timeout: Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            socket: Lane {
                pending: PendingTable::new(),
                registry: socket_registry,
            },
            websocket: Lane {
                pending: PendingTable::new(),
                registry: websocket_registry,
            },
            flush_interval,
            write_timeout,
            metrics,
        }
    }

    const fn lane(&self, protocol: Protocol) -> &Lane {
        match protocol {
            Protocol::Socket => &self.socket,
            Protocol::Websocket => &self.websocket,
        }
    }

    /// Returns the registry of `protocol`.
    #[must_use]
    pub fn registry(&self, protocol: Protocol) -> &Arc<ConnectionRegistry> {
        &self.lane(protocol).registry
    }

    /// Returns the number of users pending for `protocol`.
    #[must_use]
    pub fn pending_len(&self, protocol: Protocol) -> usize {
        self.lane(protocol).pending.len()
    }

    /// Queues a message for the next flush of its protocol, replacing any
    /// pending message for the same user.
    pub fn submit(&self, message: BusinessMessage) {
        let protocol = message.protocol;
        debug!(
            protocol = %protocol,
            user_id = %message.user_id,
            op_type = %message.op_type,
            "message submitted"
        );
        let user_id = message.user_id.clone();
        let replaced = self.lane(protocol).pending.insert(message);
        self.metrics.record_submitted();

        if let Some(previous) = replaced {
            self.metrics.record_coalesced();
            debug!(
                protocol = %protocol,
                user_id = %user_id,
                replaced_op_type = %previous.op_type,
                "pending message replaced"
            );
        }
    }

    /// Broadcasts everything pending for `protocol`.
    ///
    /// The table is taken before any write, so messages submitted during a
    /// slow broadcast land in the next cycle. A connection whose write fails
    /// or times out is closed; the rest still receive the broadcast.
    pub async fn flush(&self, protocol: Protocol) -> FlushReport {
        let lane = self.lane(protocol);
        let mut report = FlushReport::empty(protocol);

        let batch = lane.pending.take();
        if batch.is_empty() {
            return report;
        }
        report.users = batch.len();

        let payload = match serde_json::to_vec(&batch) {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                error!(protocol = %protocol, error = %e, "failed to serialize broadcast");
                return report;
            }
        };
        self.metrics.record_flush();

        for connection in lane.registry.snapshot() {
            let queued =
                tokio::time::timeout(self.write_timeout, connection.write_message(payload.clone()))
                    .await;

            match queued {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    self.metrics.record_delivery();
                }
                Ok(Err(e)) => {
                    warn!(conn_id = %connection.id(), protocol = %protocol, error = %e, "broadcast failed");
                    self.fail_delivery(&connection, &mut report);
                }
                Err(_) => {
                    warn!(
                        conn_id = %connection.id(),
                        protocol = %protocol,
                        timeout = ?self.write_timeout,
                        "broadcast timed out"
                    );
                    self.fail_delivery(&connection, &mut report);
                }
            }
        }

        debug!(
            protocol = %protocol,
            users = report.users,
            delivered = report.delivered,
            failed = report.failed,
            "flush complete"
        );
        report
    }

    fn fail_delivery(&self, connection: &Connection, report: &mut FlushReport) {
        connection.close();
        report.failed += 1;
        self.metrics.record_delivery_failure();
    }

    /// Runs the flush loop for `protocol` until `shutdown` fires, then
    /// flushes one last time.
    pub async fn run(&self, protocol: Protocol, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(protocol = %protocol, interval = ?self.flush_interval, "flush loop started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush(protocol).await;
                }
            }
        }

        let report = self.flush(protocol).await;
        info!(
            protocol = %protocol,
            users = report.users,
            delivered = report.delivered,
            "flush loop stopped"
        );
    }
}
