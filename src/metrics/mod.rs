/*!
 * # Metrics Module
 *
 * Business counters for orders, status changes, payments and notification
 * delivery, exposed in Prometheus text format at `/metrics`.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref ORDERS_CREATED: IntCounter = IntCounter::new(
        "tailortrack_orders_created_total",
        "Total number of orders created"
    )
    .expect("metric can be created");
    static ref STATUS_CHANGES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "tailortrack_status_changes_total",
            "Total number of order status changes by target status"
        ),
        &["status"]
    )
    .expect("metric can be created");
    static ref PAYMENTS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "tailortrack_payments_applied_total",
            "Total number of payments applied by method"
        ),
        &["method"]
    )
    .expect("metric can be created");
    static ref NOTIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "tailortrack_notifications_total",
            "Notification dispatch attempts by channel and outcome"
        ),
        &["channel", "outcome"]
    )
    .expect("metric can be created");
}

/// Registers every counter with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ORDERS_CREATED.clone()),
        Box::new(STATUS_CHANGES.clone()),
        Box::new(PAYMENTS_APPLIED.clone()),
        Box::new(NOTIFICATIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                error!(error = %e, "Failed to register metric");
            }
        }
    }
}

pub fn record_order_created() {
    ORDERS_CREATED.inc();
}

pub fn record_status_change(status: &str) {
    STATUS_CHANGES.with_label_values(&[status]).inc();
}

pub fn record_payment_applied(method: &str) {
    PAYMENTS_APPLIED.with_label_values(&[method]).inc();
}

pub fn record_notification(channel: &str, outcome: &str) {
    NOTIFICATIONS.with_label_values(&[channel, outcome]).inc();
}

/// Renders the registry in Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_counters() {
        record_order_created();
        record_status_change("ready");
        record_notification("sms", "not_configured");
        let text = render().unwrap();
        assert!(text.contains("tailortrack_orders_created_total"));
        assert!(text.contains("tailortrack_status_changes_total{status=\"ready\"}"));
        assert!(text.contains("channel=\"sms\""));
    }

    #[test]
    fn registering_twice_is_harmless() {
        register_metrics();
        register_metrics();
    }
}
