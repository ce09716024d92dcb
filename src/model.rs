use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Average number of hours in a billing month.
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Billable resource kinds, one collector each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ComputeInstance,
    FloatingIp,
    LoadBalancer,
    LoadBalancerTraffic,
    Volume,
    Snapshot,
    Backup,
    InstanceTraffic,
}

/// Extra label dimensions a kind publishes after `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Location,
    Type,
}

impl Dimension {
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Location => "location",
            Dimension::Type => "type",
        }
    }
}

/// How the "so far" cost of a resource is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualMode {
    /// Whole hours since creation, rounded up, times the net hourly price.
    ElapsedHours,
    /// Units consumed in the billing period times the net unit price.
    Consumed,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::FloatingIp,
        ResourceKind::LoadBalancer,
        ResourceKind::LoadBalancerTraffic,
        ResourceKind::ComputeInstance,
        ResourceKind::Backup,
        ResourceKind::InstanceTraffic,
        ResourceKind::Snapshot,
        ResourceKind::Volume,
    ];

    /// Metric name segment, `<namespace>_pricing_<slug>_hourly` and friends.
    pub fn slug(self) -> &'static str {
        match self {
            ResourceKind::ComputeInstance => "server",
            ResourceKind::FloatingIp => "floatingip",
            ResourceKind::LoadBalancer => "loadbalancer",
            ResourceKind::LoadBalancerTraffic => "loadbalancer_traffic",
            ResourceKind::Volume => "volume",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Backup => "server_backup",
            ResourceKind::InstanceTraffic => "server_traffic",
        }
    }

    pub fn dimensions(self) -> &'static [Dimension] {
        match self {
            ResourceKind::Volume => &[Dimension::Location],
            ResourceKind::Snapshot => &[],
            _ => &[Dimension::Location, Dimension::Type],
        }
    }

    /// Whether the catalog prices this kind per location. Kinds that are not
    /// location-scoped are looked up with no location at all.
    pub fn priced_by_location(self) -> bool {
        matches!(
            self,
            ResourceKind::ComputeInstance
                | ResourceKind::FloatingIp
                | ResourceKind::LoadBalancer
                | ResourceKind::Backup
        )
    }

    /// Whether the catalog prices this kind per resource type.
    pub fn priced_by_type(self) -> bool {
        self.priced_by_location()
    }

    pub fn accrual_mode(self) -> AccrualMode {
        match self {
            ResourceKind::LoadBalancerTraffic | ResourceKind::InstanceTraffic => {
                AccrualMode::Consumed
            }
            _ => AccrualMode::ElapsedHours,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Read-only view of one billable resource, rebuilt every fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub resource_type: Option<String>,
    pub created: DateTime<Utc>,
    /// Number of priced units: 1 for whole resources, GB for storage,
    /// TB of overage for traffic.
    pub quantity: f64,
}

impl Resource {
    /// Label values in the order `name`, then the kind's dimensions.
    pub fn label_values(&self, kind: ResourceKind) -> Vec<&str> {
        let mut values = vec![self.name.as_str()];
        for dim in kind.dimensions() {
            values.push(match dim {
                Dimension::Location => self.location.as_deref().unwrap_or(""),
                Dimension::Type => self.resource_type.as_deref().unwrap_or(""),
            });
        }
        values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Price {
    pub gross: f64,
    pub net: f64,
}

impl Price {
    pub fn scaled(self, factor: f64) -> Self {
        Price {
            gross: self.gross * factor,
            net: self.net * factor,
        }
    }

    fn is_valid(self) -> bool {
        self.gross.is_finite() && self.net.is_finite() && self.gross >= 0.0 && self.net >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Hourly,
    Monthly,
}

/// One immutable row of the price catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEntry {
    pub kind: ResourceKind,
    pub resource_type: Option<String>,
    pub location: Option<String>,
    pub unit: UnitType,
    pub hourly: Price,
    pub monthly: Price,
}

impl PriceEntry {
    pub fn hourly(
        kind: ResourceKind,
        resource_type: Option<String>,
        location: Option<String>,
        hourly: Price,
        monthly: Price,
    ) -> Self {
        PriceEntry {
            kind,
            resource_type,
            location,
            unit: UnitType::Hourly,
            hourly,
            monthly,
        }
    }

    /// Entry for a resource billed per month; the hourly rate is derived.
    pub fn monthly(
        kind: ResourceKind,
        resource_type: Option<String>,
        location: Option<String>,
        monthly: Price,
    ) -> Self {
        PriceEntry {
            kind,
            resource_type,
            location,
            unit: UnitType::Monthly,
            hourly: monthly.scaled(1.0 / HOURS_PER_MONTH),
            monthly,
        }
    }

    pub fn has_valid_amounts(&self) -> bool {
        self.hourly.is_valid() && self.monthly.is_valid()
    }
}
