//! Metrics collection and export for mqttgram.
//!
//! Crates record through the `metrics` crate facade using the names in
//! [`definitions`]. Nothing is recorded until [`init_metrics`] installs a
//! recorder; with the `prometheus` feature that recorder is the Prometheus
//! exporter.
//!
//! ```rust,ignore
//! use mqttgram_metrics::{counter, dispatch};
//!
//! counter!(dispatch::DELIVERIES_FAILED_TOTAL, "reason" => "timeout").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
