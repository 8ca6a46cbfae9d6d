//! Relay metrics tracking.
//!
//! Provides atomic counters for monitoring connections and message flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for the relay server.
#[derive(Debug)]
pub struct RelayMetrics {
    /// Total connections opened.
    connections_opened: AtomicU64,

    /// Total connections closed.
    connections_closed: AtomicU64,

    /// Total payloads read from peers.
    messages_received: AtomicU64,

    /// Payloads that were not valid business messages.
    parse_errors: AtomicU64,

    /// Business messages accepted into a pending table.
    messages_submitted: AtomicU64,

    /// Submitted messages that replaced a pending one for the same user.
    messages_coalesced: AtomicU64,

    /// Flush cycles that produced a broadcast.
    flushes: AtomicU64,

    /// Broadcasts queued to a connection.
    deliveries: AtomicU64,

    /// Broadcasts that could not be queued.
    delivery_failures: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            messages_submitted: AtomicU64::new(0),
            messages_coalesced: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a payload read from a peer.
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a payload that failed to parse.
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a submitted business message.
    pub fn record_submitted(&self) {
        self.messages_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a submitted message that replaced a pending one.
    pub fn record_coalesced(&self) {
        self.messages_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a flush that produced a broadcast.
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful delivery.
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed delivery.
    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total connections opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total connections closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Returns the total payloads received.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Returns the total parse errors.
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Returns the total submitted messages.
    #[must_use]
    pub fn messages_submitted(&self) -> u64 {
        self.messages_submitted.load(Ordering::Relaxed)
    }

    /// Returns the total coalesced messages.
    #[must_use]
    pub fn messages_coalesced(&self) -> u64 {
        self.messages_coalesced.load(Ordering::Relaxed)
    }

    /// Returns the total flushes.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the total deliveries.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Returns the total failed deliveries.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.connections_opened(), 0);
        assert_eq!(metrics.messages_received(), 0);
        assert_eq!(metrics.flushes(), 0);
    }

    #[test]
    fn test_active_connections() {
        let metrics = RelayMetrics::new();
        metrics.record_connection_opened();
        metrics.record_connection_opened();
        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_active_connections_never_negative() {
        let metrics = RelayMetrics::new();
        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_message_counters() {
        let metrics = RelayMetrics::new();
        metrics.record_message_received();
        metrics.record_message_received();
        metrics.record_parse_error();
        metrics.record_submitted();
        metrics.record_coalesced();
        assert_eq!(metrics.messages_received(), 2);
        assert_eq!(metrics.messages_coalesced(), 1);
        assert_eq!(metrics.parse_errors(), 1);
        assert_eq!(metrics.messages_submitted(), 1);
    }

    #[test]
    fn test_delivery_counters() {
        let metrics = RelayMetrics::new();
        metrics.record_flush();
        metrics.record_delivery();
        metrics.record_delivery();
        metrics.record_delivery_failure();
        assert_eq!(metrics.flushes(), 1);
        assert_eq!(metrics.deliveries(), 2);
        assert_eq!(metrics.delivery_failures(), 1);
    }
}
