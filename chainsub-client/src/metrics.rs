//! Client metrics definitions
//!
//! OpenTelemetry instruments describing the health of one multiplexed
//! connection. They are created only when observability is enabled via
//! `ClientBuilder::with_observability()`; otherwise nothing is recorded.
//!
//! # Metrics Collected
//!
//! - **subscriptions.opened**: Subscribe calls written to the wire (counter, by method)
//! - **subscriptions.active**: Registry entries, pending or confirmed (up/down counter)
//! - **subscriptions.closed**: Entries removed, by terminal reason (counter)
//! - **notifications.routed**: Notifications handed to a consumer (counter, by method)
//! - **frames.dropped**: Inbound frames dropped by the reader, by reason (counter)
//! - **errors.total**: Errors by type (counter)
//! - **pings.sent**: Keepalive pings written (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Meter, UpDownCounter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Subscribe calls written to the wire
    pub subscriptions_opened: Counter<u64>,
    /// Live registry entries
    pub subscriptions_active: UpDownCounter<i64>,
    /// Registry entries closed, by reason
    pub subscriptions_closed: Counter<u64>,
    /// Notifications delivered to a subscription channel
    pub notifications_routed: Counter<u64>,
    /// Frames the reader dropped
    pub frames_dropped: Counter<u64>,
    /// Errors encountered
    pub errors_total: Counter<u64>,
    /// Keepalive pings sent
    pub pings_sent: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            subscriptions_opened: meter
                .u64_counter("chainsub.client.subscriptions.opened")
                .with_description("Subscribe calls written to the wire")
                .build(),
            subscriptions_active: meter
                .i64_up_down_counter("chainsub.client.subscriptions.active")
                .with_description("Pending and confirmed subscriptions in the registry")
                .build(),
            subscriptions_closed: meter
                .u64_counter("chainsub.client.subscriptions.closed")
                .with_description("Subscriptions closed, by terminal reason")
                .build(),
            notifications_routed: meter
                .u64_counter("chainsub.client.notifications.routed")
                .with_description("Notifications delivered to a subscription")
                .build(),
            frames_dropped: meter
                .u64_counter("chainsub.client.frames.dropped")
                .with_description("Inbound frames dropped by the reader")
                .build(),
            errors_total: meter
                .u64_counter("chainsub.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            pings_sent: meter
                .u64_counter("chainsub.client.pings.sent")
                .with_description("Keepalive pings written")
                .build(),
        }
    }

    /// Record a subscribe call that reached the wire
    pub fn record_opened(&self, method: &str) {
        self.subscriptions_opened
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// Record a new registry entry
    pub fn record_registered(&self) {
        self.subscriptions_active.add(1, &[]);
    }

    /// Record a registry entry leaving, with the terminal error's kind as reason
    pub fn record_closed(&self, reason: &'static str) {
        self.subscriptions_active.add(-1, &[]);
        self.subscriptions_closed
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    /// Record a routed notification
    pub fn record_notification(&self, method: &str) {
        self.notifications_routed
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// Record a dropped frame
    pub fn record_dropped(&self, reason: &'static str) {
        self.frames_dropped
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    /// Record an error
    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type)]);
    }

    /// Record a keepalive ping
    pub fn record_ping(&self) {
        self.pings_sent.add(1, &[]);
    }
}
