//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, zone layout)
//! - `metrics` - Lock-free pipeline metrics collection

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, EvaluationCadence};
pub use metrics::{Metrics, MetricsSummary};
