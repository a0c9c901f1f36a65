//! Bridge metrics
//!
//! Recorded through the `metrics` facade. The library never installs a
//! recorder; without one every call is a no-op.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use std::time::Duration;

/// Metric names
pub const CONNECTIONS_ACTIVE: &str = "cnn_bridge_connections_active";
pub const COMMANDS_TOTAL: &str = "cnn_bridge_commands_total";
pub const REPLIES_TOTAL: &str = "cnn_bridge_replies_total";
pub const PUSH_FAILURES: &str = "cnn_bridge_push_failures_total";
pub const QUEUE_DEPTH: &str = "cnn_bridge_queue_depth";
pub const COMMAND_DURATION: &str = "cnn_bridge_command_duration_seconds";
pub const DRAINED_COMMANDS: &str = "cnn_bridge_drained_commands_total";

/// Describe metrics for whichever recorder the host installs
pub fn describe() {
    describe_gauge!(CONNECTIONS_ACTIVE, "Number of live bridge connections");
    describe_counter!(COMMANDS_TOTAL, "Commands dispatched by worker loops");
    describe_counter!(REPLIES_TOTAL, "Replies posted by worker loops");
    describe_counter!(PUSH_FAILURES, "Commands rejected by a connection queue");
    describe_gauge!(QUEUE_DEPTH, "Commands waiting when the last push happened");
    describe_histogram!(COMMAND_DURATION, "Time spent executing a command");
    describe_counter!(DRAINED_COMMANDS, "Commands discarded during teardown");
}

// ============================================================================
// Connection Metrics
// ============================================================================

pub fn record_connection_started() {
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_connection_stopped() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

// ============================================================================
// Command Metrics
// ============================================================================

/// Record a queued command and the resulting depth
#[allow(clippy::cast_precision_loss)]
pub fn record_push(depth: usize) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}

pub fn record_push_failure() {
    counter!(PUSH_FAILURES).increment(1);
}

/// Record one dispatched command
pub fn record_command(kind: &'static str, duration: Duration) {
    counter!(COMMANDS_TOTAL, "kind" => kind).increment(1);
    histogram!(COMMAND_DURATION, "kind" => kind).record(duration.as_secs_f64());
}

pub fn record_reply(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!(REPLIES_TOTAL, "result" => result).increment(1);
}

pub fn record_drained(count: usize) {
    counter!(DRAINED_COMMANDS).increment(count as u64);
}
