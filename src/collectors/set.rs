use super::{PricingCollector, ResourceCollector};
use crate::catalog::PriceCatalog;
use crate::errors::{CollectorFailure, CycleError, PricingError};
use crate::model::ResourceKind;
use crate::provider::Provider;
use chrono::{DateTime, Utc};
use prometheus::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Every resource collector, run together as one fetch cycle.
///
/// Cycles are expected to be serialized by the caller; the only state shared
/// with other tasks is the price catalog.
pub struct CollectorSet {
    collectors: Vec<Box<dyn ResourceCollector>>,
}

impl CollectorSet {
    pub fn new(collectors: Vec<Box<dyn ResourceCollector>>) -> Self {
        Self { collectors }
    }

    /// One collector per resource kind, all reading from `catalog`.
    pub fn for_all_kinds(
        catalog: Arc<PriceCatalog>,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self, PricingError> {
        let collectors = ResourceKind::ALL
            .iter()
            .map(|kind| {
                PricingCollector::new(*kind, catalog.clone(), namespace, timeout)
                    .map(|c| Box::new(c) as Box<dyn ResourceCollector>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(collectors))
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Register every collector's series. Call once at startup; registering
    /// the same series twice is rejected by the registry.
    pub fn register_all(&self, registry: &Registry) -> Result<(), PricingError> {
        for collector in &self.collectors {
            collector.metric_handles().register(registry)?;
        }
        Ok(())
    }

    pub async fn run_cycle(&self, provider: &dyn Provider) -> Result<(), CycleError> {
        self.run_cycle_at(provider, Utc::now()).await
    }

    /// Reset and run every collector, evaluating accrual at `now`. A failing
    /// collector does not stop the ones after it.
    pub async fn run_cycle_at(
        &self,
        provider: &dyn Provider,
        now: DateTime<Utc>,
    ) -> Result<(), CycleError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        for collector in &self.collectors {
            collector.metric_handles().reset();

            if let Err(error) = collector.run(provider, now).await {
                warn!(collector = collector.name(), error = %error, "collector run failed");
                failures.push(CollectorFailure {
                    collector: collector.name(),
                    error,
                });
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if failures.is_empty() {
            info!(collectors = self.collectors.len(), elapsed_ms, "fetch cycle complete");
            Ok(())
        } else {
            warn!(
                collectors = self.collectors.len(),
                failed = failures.len(),
                elapsed_ms,
                "fetch cycle finished with failures"
            );
            Err(CycleError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSnapshot;
    use crate::errors::ProviderError;
    use crate::model::{Price, PriceEntry, Resource};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use prometheus::{Encoder, TextEncoder};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Inventory that can be replaced between cycles.
    #[derive(Default)]
    struct Inventory {
        resources: Mutex<HashMap<ResourceKind, Vec<Resource>>>,
    }

    impl Inventory {
        fn set(&self, kind: ResourceKind, resources: Vec<Resource>) {
            self.resources.lock().unwrap().insert(kind, resources);
        }
    }

    #[async_trait::async_trait]
    impl Provider for Inventory {
        async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, ProviderError> {
            Ok(self
                .resources
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or_default())
        }

        async fn price_list(&self) -> Result<Vec<PriceEntry>, ProviderError> {
            Ok(vec![])
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn resource(name: &str, location: &str, resource_type: &str) -> Resource {
        Resource {
            id: name.into(),
            name: name.into(),
            location: Some(location.into()),
            resource_type: Some(resource_type.into()),
            created: now() - ChronoDuration::hours(5),
            quantity: 1.0,
        }
    }

    fn set_with_prices(entries: Vec<PriceEntry>) -> (CollectorSet, Registry) {
        let catalog = PriceCatalog::new(Duration::from_secs(1));
        catalog.install(CatalogSnapshot::build(1, now(), entries).unwrap());
        let set = CollectorSet::for_all_kinds(Arc::new(catalog), "hcloud", Duration::from_secs(1))
            .unwrap();
        let registry = Registry::new();
        set.register_all(&registry).unwrap();
        (set, registry)
    }

    fn exposition(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn prices() -> Vec<PriceEntry> {
        vec![
            PriceEntry::hourly(
                ResourceKind::ComputeInstance,
                Some("cx22".into()),
                Some("fsn1".into()),
                Price { gross: 0.006, net: 0.005 },
                Price { gross: 3.0, net: 2.5 },
            ),
            PriceEntry::monthly(
                ResourceKind::FloatingIp,
                Some("ipv4".into()),
                Some("fsn1".into()),
                Price { gross: 3.57, net: 3.0 },
            ),
        ]
    }

    #[test]
    fn test_one_collector_per_kind() {
        let (set, _) = set_with_prices(vec![]);
        assert_eq!(set.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_register_all_twice_rejected() {
        let (set, registry) = set_with_prices(vec![]);
        assert!(matches!(
            set.register_all(&registry),
            Err(PricingError::Registration(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_resource_loses_its_series() {
        let (set, registry) = set_with_prices(prices());
        let inventory = Inventory::default();
        inventory.set(
            ResourceKind::ComputeInstance,
            vec![resource("web-1", "fsn1", "cx22"), resource("web-2", "fsn1", "cx22")],
        );

        set.run_cycle_at(&inventory, now()).await.unwrap();
        let text = exposition(&registry);
        assert!(text.contains("name=\"web-1\""));
        assert!(text.contains("name=\"web-2\""));

        inventory.set(ResourceKind::ComputeInstance, vec![resource("web-2", "fsn1", "cx22")]);
        set.run_cycle_at(&inventory, now()).await.unwrap();
        let text = exposition(&registry);
        assert!(!text.contains("name=\"web-1\""));
        assert!(text.contains("name=\"web-2\""));
    }

    #[tokio::test]
    async fn test_failed_collector_does_not_block_others() {
        let (set, registry) = set_with_prices(prices());
        let inventory = Inventory::default();
        inventory.set(
            ResourceKind::ComputeInstance,
            vec![resource("web-1", "hel1", "cx22")],
        );
        inventory.set(ResourceKind::FloatingIp, vec![resource("ip-1", "fsn1", "ipv4")]);

        let err = set.run_cycle_at(&inventory, now()).await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].collector, "server");
        assert!(matches!(err.failures[0].error, PricingError::PriceNotFound { .. }));

        let text = exposition(&registry);
        assert!(text.contains(
            "hcloud_pricing_floatingip_monthly{location=\"fsn1\",name=\"ip-1\",type=\"ipv4\"} 3.57"
        ));
    }

    #[tokio::test]
    async fn test_every_failure_is_aggregated() {
        let (set, _) = set_with_prices(vec![]);
        let inventory = Inventory::default();
        inventory.set(ResourceKind::ComputeInstance, vec![resource("web-1", "fsn1", "cx22")]);
        inventory.set(ResourceKind::LoadBalancer, vec![resource("lb-1", "fsn1", "lb11")]);

        let err = set.run_cycle_at(&inventory, now()).await.unwrap_err();
        let failed: Vec<_> = err.failures.iter().map(|f| f.collector).collect();
        assert_eq!(failed, vec!["loadbalancer", "server"]);
    }

    #[tokio::test]
    async fn test_empty_inventory_succeeds() {
        let (set, registry) = set_with_prices(prices());
        set.run_cycle_at(&Inventory::default(), now()).await.unwrap();
        assert!(registry.gather().iter().all(|mf| mf.get_metric().is_empty()));
    }
}
