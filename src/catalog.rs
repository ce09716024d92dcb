//! Cached provider price list.
//!
//! The catalog holds one immutable [`CatalogSnapshot`] behind an [`ArcSwap`].
//! `sync` builds a complete replacement off to the side and swaps it in with a
//! single pointer store, so `lookup` is safe to call from any task while a sync
//! is running: each lookup loads one snapshot and reads only from it.

use crate::errors::{PricingError, ProviderError};
use crate::model::{PriceEntry, ResourceKind};
use crate::provider::{with_timeout, Provider};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type PriceKey = (ResourceKind, Option<String>, Option<String>);

/// One complete, versioned price list.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    entries: HashMap<PriceKey, PriceEntry>,
}

impl CatalogSnapshot {
    /// Index a price list, rejecting duplicate keys and invalid amounts.
    pub fn build(
        version: u64,
        fetched_at: DateTime<Utc>,
        list: Vec<PriceEntry>,
    ) -> Result<Self, PricingError> {
        let mut entries = HashMap::with_capacity(list.len());
        for entry in list {
            if !entry.has_valid_amounts() {
                return Err(PricingError::MalformedCatalog {
                    reason: format!(
                        "{} price for {:?} in {:?} has an invalid amount",
                        entry.kind, entry.resource_type, entry.location
                    ),
                });
            }
            let key = (entry.kind, entry.resource_type.clone(), entry.location.clone());
            if entries.contains_key(&key) {
                return Err(PricingError::MalformedCatalog {
                    reason: format!(
                        "duplicate {} price for {:?} in {:?}",
                        entry.kind, entry.resource_type, entry.location
                    ),
                });
            }
            entries.insert(key, entry);
        }
        Ok(Self {
            version,
            fetched_at: Some(fetched_at),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PriceEntry> {
        self.entries.values()
    }

    /// Exact match on kind, type and location; `None` only matches `None`.
    pub fn lookup(
        &self,
        kind: ResourceKind,
        resource_type: Option<&str>,
        location: Option<&str>,
    ) -> Result<&PriceEntry, PricingError> {
        let key = (
            kind,
            resource_type.map(str::to_owned),
            location.map(str::to_owned),
        );
        self.entries
            .get(&key)
            .ok_or_else(|| PricingError::price_not_found(kind.slug(), resource_type, location))
    }
}

/// Shared price catalog, constructed once and handed to every collector.
pub struct PriceCatalog {
    current: ArcSwap<CatalogSnapshot>,
    timeout: Duration,
}

impl PriceCatalog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            current: ArcSwap::from_pointee(CatalogSnapshot::default()),
            timeout,
        }
    }

    /// Fetch the provider's price list and swap it in whole. On any failure the
    /// previous snapshot stays in force.
    pub async fn sync(&self, provider: &dyn Provider) -> Result<(), PricingError> {
        let list = with_timeout("/pricing", self.timeout, provider.price_list())
            .await
            .map_err(|e| match e {
                ProviderError::Decode { .. } => PricingError::MalformedCatalog {
                    reason: e.to_string(),
                },
                other => PricingError::ProviderUnavailable(other),
            });

        let list = match list {
            Ok(list) => list,
            Err(e) => {
                warn!(
                    error = %e,
                    version = self.version(),
                    "price catalog sync failed, keeping previous snapshot"
                );
                return Err(e);
            }
        };

        let version = self.version() + 1;
        let snapshot = match CatalogSnapshot::build(version, Utc::now(), list) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    error = %e,
                    version = version - 1,
                    "rejected price catalog, keeping previous snapshot"
                );
                return Err(e);
            }
        };

        info!(
            version,
            entries = snapshot.len(),
            fetched_at = ?snapshot.fetched_at,
            "price catalog refreshed"
        );
        self.install(snapshot);
        Ok(())
    }

    /// Swap in a fully built snapshot.
    pub fn install(&self, snapshot: CatalogSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// The snapshot in force right now; stays valid after later syncs.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn lookup(
        &self,
        kind: ResourceKind,
        resource_type: Option<&str>,
        location: Option<&str>,
    ) -> Result<PriceEntry, PricingError> {
        let snapshot = self.current.load();
        let entry = snapshot.lookup(kind, resource_type, location)?.clone();
        debug!(%kind, ?resource_type, ?location, version = snapshot.version, "price resolved");
        Ok(entry)
    }
}
