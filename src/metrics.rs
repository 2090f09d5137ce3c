// ABOUTME: Counter helpers so call sites record metrics with one line.
// ABOUTME: Exporter wiring is left to the embedding application.

/// Record a command invocation by trigger name.
pub fn record_command(trigger: &str) {
    metrics::counter!("chirp_commands_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a handler failure (error, panic, or timeout).
pub fn record_handler_error(trigger: &str, reason: &'static str) {
    metrics::counter!(
        "chirp_handler_errors_total",
        "trigger" => trigger.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a dispatched event by kind.
pub fn record_event(kind: &str) {
    metrics::counter!("chirp_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record a gateway reconnect attempt.
pub fn record_reconnect() {
    metrics::counter!("chirp_gateway_reconnects_total").increment(1);
}

/// Record a store health transition.
pub fn record_store_degraded(store: &'static str) {
    metrics::counter!("chirp_store_degraded_total", "store" => store).increment(1);
}
