//! Chat turn metrics
//!
//! Recorded through the `metrics` facade; nothing is collected unless a
//! recorder is installed (see the `prometheus` feature).
//!
//! # Metrics
//!
//! - `chat_turns_total`: Counter of turns started, by provider
//! - `chat_turn_duration_seconds`: Histogram of turn duration, by status
//! - `chat_tool_rounds`: Histogram of tool rounds used per turn
//! - `chat_turn_completions_total`: Counter of finished turns, by status
//! - `chat_tool_calls_total`: Counter of tool invocations, by tool and outcome
//! - `chat_active_turns`: Gauge of turns in progress
//!
//! # Examples
//!
//! ```
//! use parley::chat::metrics::TurnMetrics;
//!
//! let metrics = TurnMetrics::new("OpenAI");
//! metrics.record_tool_call("get_weather", true);
//! metrics.record_completion(1, "completed");
//! ```

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for one chat turn
///
/// Only the first `record_*` terminal call counts; later ones are ignored.
#[derive(Debug)]
pub struct TurnMetrics {
    provider: String,
    start: Instant,
    recorded: AtomicBool,
}

impl TurnMetrics {
    pub fn new(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        increment_counter!("chat_turns_total", "provider" => provider.clone());
        increment_gauge!("chat_active_turns", 1.0);

        Self {
            provider,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Record one tool invocation
    pub fn record_tool_call(&self, tool: &str, success: bool) {
        increment_counter!(
            "chat_tool_calls_total",
            "tool" => tool.to_string(),
            "outcome" => if success { "success" } else { "error" }
        );
    }

    /// Record the end of the turn with its status (`completed`, `failed`)
    pub fn record_completion(&self, tool_rounds: usize, status: &str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "chat_turn_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "provider" => self.provider.clone(),
            "status" => status.to_string()
        );
        histogram!("chat_tool_rounds", tool_rounds as f64);
        increment_counter!(
            "chat_turn_completions_total",
            "provider" => self.provider.clone(),
            "status" => status.to_string()
        );
        decrement_gauge!("chat_active_turns", 1.0);
    }
}

impl Drop for TurnMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("chat_active_turns", 1.0);
        }
    }
}

/// Install the Prometheus recorder when built with the `prometheus` feature
///
/// Without the feature this does nothing and metrics are discarded.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        if let Err(e) = PrometheusBuilder::new().install() {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_recorded_once() {
        let m = TurnMetrics::new("Groq");
        assert_eq!(m.provider(), "Groq");
        m.record_completion(2, "completed");
        m.record_completion(2, "failed");
        assert!(m.recorded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_without_completion() {
        let m = TurnMetrics::new("OpenAI");
        m.record_tool_call("add", false);
        drop(m);
    }
}
