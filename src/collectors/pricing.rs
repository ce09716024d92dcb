use super::accrual::accrued_cost;
use super::{MetricHandles, ResourceCollector};
use crate::catalog::PriceCatalog;
use crate::errors::PricingError;
use crate::model::ResourceKind;
use crate::provider::{with_timeout, Provider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Publishes cost series for every resource of one kind.
///
/// The kind decides the provider enumeration, which keys the price is looked
/// up by, the label schema, and how accrual is computed.
pub struct PricingCollector {
    kind: ResourceKind,
    catalog: Arc<PriceCatalog>,
    metrics: MetricHandles,
    timeout: Duration,
}

impl PricingCollector {
    pub fn new(
        kind: ResourceKind,
        catalog: Arc<PriceCatalog>,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self, PricingError> {
        Ok(Self {
            kind,
            catalog,
            metrics: MetricHandles::new(namespace, kind)?,
            timeout,
        })
    }
}

#[async_trait]
impl ResourceCollector for PricingCollector {
    fn name(&self) -> &'static str {
        self.kind.slug()
    }

    fn metric_handles(&self) -> &MetricHandles {
        &self.metrics
    }

    async fn run(&self, provider: &dyn Provider, now: DateTime<Utc>) -> Result<(), PricingError> {
        let kind = self.kind;
        let resources = with_timeout(kind.slug(), self.timeout, provider.list_resources(kind))
            .await
            .map_err(PricingError::ProviderUnavailable)?;

        for resource in &resources {
            let location = resource.location.as_deref().filter(|_| kind.priced_by_location());
            let resource_type = resource.resource_type.as_deref().filter(|_| kind.priced_by_type());
            let price = self.catalog.lookup(kind, resource_type, location)?;

            let labels = resource.label_values(kind);
            let accrued = accrued_cost(kind.accrual_mode(), &price, resource, now);

            self.metrics
                .hourly
                .with_label_values(&labels)
                .set(price.hourly.gross * resource.quantity);
            self.metrics
                .monthly
                .with_label_values(&labels)
                .set(price.monthly.gross * resource.quantity);
            self.metrics.current.with_label_values(&labels).set(accrued);

            // absolute value each cycle, not an increment on last cycle's total
            let counter = self.metrics.current_counter.with_label_values(&labels);
            counter.reset();
            counter.inc_by(accrued);

            debug!(collector = kind.slug(), resource = %resource.name, accrued, "resource priced");
        }

        debug!(collector = kind.slug(), resources = resources.len(), "collector run complete");
        Ok(())
    }
}
