use thiserror::Error;

//typed errors so collectors and the cycle can be tested without a live API

/// Failure reported by a provider client before any domain mapping.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
}

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),

    #[error("no {kind} price for type {resource_type} in location {location}")]
    PriceNotFound {
        kind: &'static str,
        resource_type: String,
        location: String,
    },

    #[error("malformed price catalog: {reason}")]
    MalformedCatalog { reason: String },

    #[error("failed to register metric series: {0}")]
    Registration(#[from] prometheus::Error),
}

impl PricingError {
    pub(crate) fn price_not_found(
        kind: &'static str,
        resource_type: Option<&str>,
        location: Option<&str>,
    ) -> Self {
        PricingError::PriceNotFound {
            kind,
            resource_type: resource_type.unwrap_or("<none>").to_string(),
            location: location.unwrap_or("<none>").to_string(),
        }
    }
}

/// A single collector's failure within a fetch cycle.
#[derive(Debug)]
pub struct CollectorFailure {
    pub collector: &'static str,
    pub error: PricingError,
}

/// Every collector failure from one fetch cycle.
#[derive(Error, Debug)]
#[error("{} collector(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct CycleError {
    pub failures: Vec<CollectorFailure>,
}

fn summarize(failures: &[CollectorFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.collector, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
