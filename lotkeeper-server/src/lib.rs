//! # lotkeeper-server
//!
//! HTTP server for lotkeeper.
//!
//! This crate provides:
//! - JSON endpoints for lots, parking, maintenance and reports
//! - Mapping of engine errors to HTTP status codes
//! - YAML + environment configuration
//! - Prometheus metrics on a separate listener

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{
    BillingConfig, Config, ConfigError, FsyncPolicy, LotsConfig, MetricsConfig, NetworkConfig,
    StorageBackend, StorageSettings,
};
pub use error::ServerError;
pub use handler::{Reply, RequestHandler, Route};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig};
