//! Lightweight in-process metrics.
//!
//! Counters, gauges, and histograms stored as atomics behind `DashMap`
//! label sets, rendered in Prometheus text format by `/metrics`.

pub mod metrics;

pub use metrics::WatchmanMetrics;
