pub mod accrual;
pub mod pricing;
pub mod set;

use crate::errors::PricingError;
use crate::model::ResourceKind;
use crate::provider::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prometheus::{CounterVec, GaugeVec, Opts, Registry};

pub use pricing::PricingCollector;
pub use set::CollectorSet;

#[async_trait]
pub trait ResourceCollector: Send + Sync {
    /// name of the collector as used in logs and aggregate errors
    fn name(&self) -> &'static str;

    /// the four series this collector writes.
    fn metric_handles(&self) -> &MetricHandles;

    /// enumerate this kind's resources, price them and publish their series
    /// as of `now`.
    async fn run(&self, provider: &dyn Provider, now: DateTime<Utc>) -> Result<(), PricingError>;
}

/// hourly, monthly, current and current_counter series for one resource kind.
/// All four share one label schema.
#[derive(Clone)]
pub struct MetricHandles {
    pub hourly: GaugeVec,
    pub monthly: GaugeVec,
    pub current: GaugeVec,
    pub current_counter: CounterVec,
}

impl MetricHandles {
    pub fn new(namespace: &str, kind: ResourceKind) -> Result<Self, PricingError> {
        let resource = kind.slug();
        let mut labels = vec!["name"];
        labels.extend(kind.dimensions().iter().map(|d| d.label()));

        let opts = |suffix: &str, help: String| {
            Opts::new(format!("{resource}_{suffix}"), help)
                .namespace(namespace)
                .subsystem("pricing")
        };

        Ok(Self {
            hourly: GaugeVec::new(
                opts("hourly", format!("The cost of the resource {resource} per hour")),
                &labels,
            )?,
            monthly: GaugeVec::new(
                opts("monthly", format!("The cost of the resource {resource} per month")),
                &labels,
            )?,
            current: GaugeVec::new(
                opts("current", format!("The cost of the resource {resource} so far")),
                &labels,
            )?,
            current_counter: CounterVec::new(
                opts("current_counter", format!("The cost of the resource {resource} so far")),
                &labels,
            )?,
        })
    }

    /// Drop every label combination from all four series.
    pub fn reset(&self) {
        self.hourly.reset();
        self.monthly.reset();
        self.current.reset();
        self.current_counter.reset();
    }

    pub fn register(&self, registry: &Registry) -> Result<(), PricingError> {
        registry.register(Box::new(self.hourly.clone()))?;
        registry.register(Box::new(self.monthly.clone()))?;
        registry.register(Box::new(self.current.clone()))?;
        registry.register(Box::new(self.current_counter.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_follow_convention() {
        let handles = MetricHandles::new("hcloud", ResourceKind::ComputeInstance).unwrap();
        let registry = Registry::new();
        handles.register(&registry).unwrap();
        handles.hourly.with_label_values(&["web-1", "fsn1", "cx22"]).set(1.0);
        handles.monthly.with_label_values(&["web-1", "fsn1", "cx22"]).set(1.0);
        handles.current.with_label_values(&["web-1", "fsn1", "cx22"]).set(1.0);
        handles.current_counter.with_label_values(&["web-1", "fsn1", "cx22"]).inc();

        let mut names: Vec<String> = registry
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "hcloud_pricing_server_current",
                "hcloud_pricing_server_current_counter",
                "hcloud_pricing_server_hourly",
                "hcloud_pricing_server_monthly",
            ]
        );
    }

    #[test]
    fn test_label_schema_is_per_kind() {
        let handles = MetricHandles::new("hcloud", ResourceKind::Snapshot).unwrap();
        assert!(handles.hourly.get_metric_with_label_values(&["nightly"]).is_ok());
        assert!(handles
            .current_counter
            .get_metric_with_label_values(&["nightly", "fsn1"])
            .is_err());
    }

    #[test]
    fn test_reset_clears_all_series() {
        let handles = MetricHandles::new("hcloud", ResourceKind::Volume).unwrap();
        let registry = Registry::new();
        handles.register(&registry).unwrap();
        handles.current.with_label_values(&["data", "fsn1"]).set(2.0);
        handles.current_counter.with_label_values(&["data", "fsn1"]).inc_by(2.0);

        handles.reset();

        assert!(registry.gather().iter().all(|mf| mf.get_metric().is_empty()));
    }
}
