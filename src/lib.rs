//! Polls the Hetzner Cloud inventory and publishes estimated per-resource
//! costs as Prometheus series.

pub mod catalog;
pub mod collectors;
pub mod config;
pub mod errors;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod server;
