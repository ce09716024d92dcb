use crate::catalog::PriceCatalog;
use crate::collectors::CollectorSet;
use crate::config::CycleErrorPolicy;
use crate::errors::CycleError;
use crate::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Apply the cycle error policy to one cycle's outcome.
pub fn apply_policy(
    result: Result<(), CycleError>,
    policy: CycleErrorPolicy,
) -> Result<(), CycleError> {
    match (result, policy) {
        (Ok(()), _) => Ok(()),
        (Err(e), CycleErrorPolicy::Exit) => {
            error!(error = %e, "fetch cycle failed, exiting");
            Err(e)
        }
        (Err(e), CycleErrorPolicy::Continue) => {
            warn!(error = %e, "fetch cycle failed, continuing");
            Ok(())
        }
    }
}

/// Run a fetch cycle immediately and then every `period`. Cycles never
/// overlap: a cycle that overruns delays the next tick instead of stacking.
/// Returns only when the policy says a failed cycle is fatal.
pub async fn run_fetch_loop(
    set: Arc<CollectorSet>,
    provider: Arc<dyn Provider>,
    period: Duration,
    policy: CycleErrorPolicy,
) -> Result<(), CycleError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        apply_policy(set.run_cycle(provider.as_ref()).await, policy)?;
    }
}

/// Refresh the price catalog every `period`, starting one period from now.
/// A failed refresh is logged and the previous snapshot stays in use until the
/// next tick.
pub async fn run_catalog_refresh_loop(
    catalog: Arc<PriceCatalog>,
    provider: Arc<dyn Provider>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match catalog.sync(provider.as_ref()).await {
            Ok(()) => debug!(version = catalog.version(), "scheduled catalog refresh succeeded"),
            Err(e) => warn!(
                error = %e,
                version = catalog.version(),
                next_in_secs = period.as_secs(),
                "scheduled catalog refresh failed"
            ),
        }
    }
}
