use crate::model::{AccrualMode, PriceEntry, Resource};
use chrono::{DateTime, TimeDelta, Utc};

/// Whole hours between `created` and `now`, partial hours rounded up at full
/// precision. A creation time in the future yields zero.
pub fn billable_hours(created: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let elapsed = now - created;
    if elapsed <= TimeDelta::zero() {
        return 0;
    }
    let whole = elapsed.num_hours();
    if elapsed > TimeDelta::hours(whole) {
        whole as u64 + 1
    } else {
        whole as u64
    }
}

/// Estimated cost of `resource` accrued as of `now`, never negative.
pub fn accrued_cost(
    mode: AccrualMode,
    price: &PriceEntry,
    resource: &Resource,
    now: DateTime<Utc>,
) -> f64 {
    let cost = match mode {
        AccrualMode::ElapsedHours => {
            billable_hours(resource.created, now) as f64 * price.hourly.net * resource.quantity
        }
        AccrualMode::Consumed => price.monthly.net * resource.quantity,
    };
    cost.max(0.0)
}
