use crate::provider::hcloud::DEFAULT_ENDPOINT;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// What to do when a fetch cycle reports any collector failure.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleErrorPolicy {
    /// Exit the process and leave recovery to the supervisor.
    Exit,
    /// Log the failures and keep serving the last published series.
    Continue,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hcloud-pricing-exporter", version, about)]
pub struct Config {
    /// Token to authenticate against the Hetzner Cloud API.
    #[arg(long, env = "HCLOUD_TOKEN", hide_env_values = true)]
    pub hcloud_token: String,

    /// Port the metrics endpoint listens on.
    #[arg(long, env = "HCLOUD_PRICING_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds between resource fetch cycles.
    #[arg(long, env = "HCLOUD_PRICING_FETCH_INTERVAL_SECS", default_value_t = 300)]
    pub fetch_interval_secs: u64,

    /// Price catalog refresh interval, as a multiple of the fetch interval.
    #[arg(long, env = "HCLOUD_PRICING_CATALOG_REFRESH_FACTOR", default_value_t = 10)]
    pub catalog_refresh_factor: u32,

    /// Upper bound on any single provider call, in seconds.
    #[arg(long, env = "HCLOUD_PRICING_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Metric namespace, the first segment of every series name.
    #[arg(long, env = "HCLOUD_PRICING_NAMESPACE", default_value = "hcloud")]
    pub namespace: String,

    /// Base URL of the provider API.
    #[arg(long, env = "HCLOUD_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub api_endpoint: String,

    /// Behaviour when a fetch cycle fails.
    #[arg(
        long,
        env = "HCLOUD_PRICING_ON_CYCLE_ERROR",
        value_enum,
        default_value_t = CycleErrorPolicy::Exit
    )]
    pub on_cycle_error: CycleErrorPolicy,

    /// Enable JSON structured logging.
    #[arg(long, env = "HCLOUD_PRICING_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl Config {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs.max(1))
    }

    pub fn catalog_refresh_interval(&self) -> Duration {
        self.fetch_interval() * self.catalog_refresh_factor.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
