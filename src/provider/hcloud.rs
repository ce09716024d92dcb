use super::Provider;
use crate::errors::ProviderError;
use crate::model::{Price, PriceEntry, Resource, ResourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

const PER_PAGE: u32 = 50;
const BYTES_PER_TB: f64 = 1_000_000_000_000.0;

/// Hetzner Cloud API client.
pub struct HcloudClient {
    endpoint: String,
    token: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HcloudClient {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hcloud-pricing-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Request {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            endpoint,
            token: token.into(),
            timeout,
            client,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        endpoint: path.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ProviderError::Request {
                        endpoint: path.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint: path.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ProviderError::Request {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;
        decode(path, &body)
    }

    /// Walk every page of a list endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ];
            query.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));

            let body: Page<T> = self.get(path, &query).await?;
            items.extend(body.items);
            match body.meta.and_then(|m| m.pagination.next_page) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(items)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Provider for HcloudClient {
    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<Resource>, ProviderError> {
        match kind {
            ResourceKind::ComputeInstance
            | ResourceKind::Backup
            | ResourceKind::InstanceTraffic => {
                let servers: Vec<ApiServer> = self.list_all("/servers", &[]).await?;
                Ok(servers_as(kind, servers))
            }
            ResourceKind::FloatingIp => {
                let ips: Vec<ApiFloatingIp> = self.list_all("/floating_ips", &[]).await?;
                Ok(ips.into_iter().map(ApiFloatingIp::into_resource).collect())
            }
            ResourceKind::LoadBalancer | ResourceKind::LoadBalancerTraffic => {
                let lbs: Vec<ApiLoadBalancer> = self.list_all("/load_balancers", &[]).await?;
                Ok(load_balancers_as(kind, lbs))
            }
            ResourceKind::Volume => {
                let volumes: Vec<ApiVolume> = self.list_all("/volumes", &[]).await?;
                Ok(volumes.into_iter().map(ApiVolume::into_resource).collect())
            }
            ResourceKind::Snapshot => {
                let images: Vec<ApiImage> =
                    self.list_all("/images", &[("type", "snapshot")]).await?;
                Ok(images.into_iter().map(ApiImage::into_resource).collect())
            }
        }
    }

    async fn price_list(&self) -> Result<Vec<PriceEntry>, ProviderError> {
        let body: PricingResponse = self.get("/pricing", &[]).await?;
        body.pricing.into_entries()
    }
}

// ─────────────────────────────────────────────
// API payloads
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(
        alias = "servers",
        alias = "floating_ips",
        alias = "load_balancers",
        alias = "volumes",
        alias = "images"
    )]
    items: Vec<T>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiDatacenter {
    location: Named,
}

#[derive(Debug, Deserialize)]
struct ApiServer {
    id: u64,
    name: String,
    created: DateTime<Utc>,
    server_type: Named,
    datacenter: ApiDatacenter,
    backup_window: Option<String>,
    outgoing_traffic: Option<u64>,
    included_traffic: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiFloatingIp {
    id: u64,
    name: String,
    #[serde(rename = "type")]
    ip_type: String,
    home_location: Named,
    created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiLoadBalancer {
    id: u64,
    name: String,
    created: DateTime<Utc>,
    location: Named,
    load_balancer_type: Named,
    outgoing_traffic: Option<u64>,
    included_traffic: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiVolume {
    id: u64,
    name: String,
    size: f64,
    location: Named,
    created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    id: u64,
    description: String,
    image_size: Option<f64>,
    created: DateTime<Utc>,
}

/// Outgoing traffic above the included allowance, in TB.
fn overage_tb(outgoing: Option<u64>, included: Option<u64>) -> f64 {
    let over = outgoing
        .unwrap_or(0)
        .saturating_sub(included.unwrap_or(0));
    over as f64 / BYTES_PER_TB
}

fn servers_as(kind: ResourceKind, servers: Vec<ApiServer>) -> Vec<Resource> {
    servers
        .into_iter()
        .filter(|s| kind != ResourceKind::Backup || s.backup_window.is_some())
        .map(|s| {
            let quantity = match kind {
                ResourceKind::InstanceTraffic => overage_tb(s.outgoing_traffic, s.included_traffic),
                _ => 1.0,
            };
            Resource {
                id: s.id.to_string(),
                name: s.name,
                location: Some(s.datacenter.location.name),
                resource_type: Some(s.server_type.name),
                created: s.created,
                quantity,
            }
        })
        .collect()
}

fn load_balancers_as(kind: ResourceKind, lbs: Vec<ApiLoadBalancer>) -> Vec<Resource> {
    lbs.into_iter()
        .map(|lb| Resource {
            id: lb.id.to_string(),
            name: lb.name,
            location: Some(lb.location.name),
            resource_type: Some(lb.load_balancer_type.name),
            created: lb.created,
            quantity: match kind {
                ResourceKind::LoadBalancerTraffic => {
                    overage_tb(lb.outgoing_traffic, lb.included_traffic)
                }
                _ => 1.0,
            },
        })
        .collect()
}

impl ApiFloatingIp {
    fn into_resource(self) -> Resource {
        Resource {
            id: self.id.to_string(),
            name: self.name,
            location: Some(self.home_location.name),
            resource_type: Some(self.ip_type),
            created: self.created,
            quantity: 1.0,
        }
    }
}

impl ApiVolume {
    fn into_resource(self) -> Resource {
        Resource {
            id: self.id.to_string(),
            name: self.name,
            location: Some(self.location.name),
            resource_type: None,
            created: self.created,
            quantity: self.size,
        }
    }
}

impl ApiImage {
    fn into_resource(self) -> Resource {
        Resource {
            id: self.id.to_string(),
            name: self.description,
            location: None,
            resource_type: None,
            created: self.created,
            quantity: self.image_size.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    pricing: ApiPricing,
}

#[derive(Debug, Deserialize)]
struct ApiPricing {
    floating_ips: Vec<ApiTypedPrices>,
    image: ApiPerGb,
    load_balancer_types: Vec<ApiTypedPrices>,
    server_backup: ApiBackup,
    server_types: Vec<ApiTypedPrices>,
    /// deprecated global traffic price; newer payloads may omit it
    traffic: Option<ApiPerTb>,
    volume: ApiPerGb,
}

#[derive(Debug, Deserialize)]
struct ApiTypedPrices {
    #[serde(alias = "type")]
    name: String,
    prices: Vec<ApiLocationPrice>,
}

#[derive(Debug, Deserialize)]
struct ApiLocationPrice {
    location: String,
    price_hourly: Option<ApiPrice>,
    price_monthly: ApiPrice,
}

#[derive(Debug, Deserialize)]
struct ApiPerGb {
    price_per_gb_month: ApiPrice,
}

#[derive(Debug, Deserialize)]
struct ApiPerTb {
    price_per_tb: ApiPrice,
}

#[derive(Debug, Deserialize)]
struct ApiBackup {
    percentage: String,
}

/// Amounts arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct ApiPrice {
    net: String,
    gross: String,
}

fn parse_amount(field: &str, raw: &str) -> Result<f64, ProviderError> {
    raw.trim().parse::<f64>().map_err(|_| ProviderError::Decode {
        endpoint: "/pricing".into(),
        reason: format!("invalid {field} amount {raw:?}"),
    })
}

impl ApiPrice {
    fn parse(&self) -> Result<Price, ProviderError> {
        Ok(Price {
            gross: parse_amount("gross", &self.gross)?,
            net: parse_amount("net", &self.net)?,
        })
    }
}

impl ApiPricing {
    fn into_entries(self) -> Result<Vec<PriceEntry>, ProviderError> {
        let mut entries = Vec::new();
        let percentage = parse_amount("server_backup percentage", &self.server_backup.percentage)?;
        let backup_factor = percentage / 100.0;

        for server_type in &self.server_types {
            for p in &server_type.prices {
                let monthly = p.price_monthly.parse()?;
                let hourly = match &p.price_hourly {
                    Some(h) => h.parse()?,
                    None => monthly.scaled(1.0 / crate::model::HOURS_PER_MONTH),
                };
                entries.push(PriceEntry::hourly(
                    ResourceKind::ComputeInstance,
                    Some(server_type.name.clone()),
                    Some(p.location.clone()),
                    hourly,
                    monthly,
                ));
                entries.push(PriceEntry::hourly(
                    ResourceKind::Backup,
                    Some(server_type.name.clone()),
                    Some(p.location.clone()),
                    hourly.scaled(backup_factor),
                    monthly.scaled(backup_factor),
                ));
            }
        }

        for lb_type in &self.load_balancer_types {
            for p in &lb_type.prices {
                let monthly = p.price_monthly.parse()?;
                let entry = match &p.price_hourly {
                    Some(h) => PriceEntry::hourly(
                        ResourceKind::LoadBalancer,
                        Some(lb_type.name.clone()),
                        Some(p.location.clone()),
                        h.parse()?,
                        monthly,
                    ),
                    None => PriceEntry::monthly(
                        ResourceKind::LoadBalancer,
                        Some(lb_type.name.clone()),
                        Some(p.location.clone()),
                        monthly,
                    ),
                };
                entries.push(entry);
            }
        }

        for ip_type in &self.floating_ips {
            for p in &ip_type.prices {
                entries.push(PriceEntry::monthly(
                    ResourceKind::FloatingIp,
                    Some(ip_type.name.clone()),
                    Some(p.location.clone()),
                    p.price_monthly.parse()?,
                ));
            }
        }

        if let Some(traffic) = &self.traffic {
            let per_tb = traffic.price_per_tb.parse()?;
            for kind in [ResourceKind::InstanceTraffic, ResourceKind::LoadBalancerTraffic] {
                entries.push(PriceEntry::monthly(kind, None, None, per_tb));
            }
        }
        entries.push(PriceEntry::monthly(
            ResourceKind::Volume,
            None,
            None,
            self.volume.price_per_gb_month.parse()?,
        ));
        entries.push(PriceEntry::monthly(
            ResourceKind::Snapshot,
            None,
            None,
            self.image.price_per_gb_month.parse()?,
        ));

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitType;

    const PRICING: &str = r#"{
      "pricing": {
        "currency": "EUR",
        "vat_rate": "19.00",
        "floating_ips": [
          {"type": "ipv4", "prices": [
            {"location": "fsn1",
             "price_monthly": {"net": "3.0000000000", "gross": "3.5700000000000000"}}
          ]}
        ],
        "image": {"price_per_gb_month": {"net": "0.0110000000", "gross": "0.0130900000000000"}},
        "load_balancer_types": [
          {"id": 1, "name": "lb11", "prices": [
            {"location": "nbg1",
             "price_hourly": {"net": "0.0082000000", "gross": "0.0097580000000000"},
             "price_monthly": {"net": "5.3900000000", "gross": "6.4141000000000000"}}
          ]}
        ],
        "server_backup": {"percentage": "20.0000000000"},
        "server_types": [
          {"id": 1, "name": "cx22", "prices": [
            {"location": "fsn1",
             "price_hourly": {"net": "0.0050000000", "gross": "0.0060000000000000"},
             "price_monthly": {"net": "2.5000000000", "gross": "3.0000000000000000"}}
          ]}
        ],
        "traffic": {"price_per_tb": {"net": "1.0000000000", "gross": "1.1900000000000000"}},
        "volume": {"price_per_gb_month": {"net": "0.0440000000", "gross": "0.0523600000000000"}}
      }
    }"#;

    fn entries() -> Vec<PriceEntry> {
        let body: PricingResponse = decode("/pricing", PRICING).unwrap();
        body.pricing.into_entries().unwrap()
    }

    fn find<'a>(
        entries: &'a [PriceEntry],
        kind: ResourceKind,
        location: Option<&str>,
    ) -> &'a PriceEntry {
        entries
            .iter()
            .find(|e| e.kind == kind && e.location.as_deref() == location)
            .unwrap()
    }

    #[test]
    fn test_pricing_maps_every_kind() {
        let entries = entries();
        for kind in ResourceKind::ALL {
            assert!(entries.iter().any(|e| e.kind == kind), "missing {kind}");
        }
    }

    #[test]
    fn test_server_type_prices() {
        let entries = entries();
        let server = find(&entries, ResourceKind::ComputeInstance, Some("fsn1"));
        assert_eq!(server.resource_type.as_deref(), Some("cx22"));
        assert_eq!(server.unit, UnitType::Hourly);
        assert!((server.hourly.gross - 0.006).abs() < 1e-12);
        assert!((server.hourly.net - 0.005).abs() < 1e-12);
        assert!((server.monthly.gross - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_backup_is_percentage_of_server_price() {
        let entries = entries();
        let backup = find(&entries, ResourceKind::Backup, Some("fsn1"));
        assert!((backup.monthly.gross - 0.6).abs() < 1e-9);
        assert!((backup.hourly.net - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_storage_prices_are_location_independent() {
        let entries = entries();
        let volume = find(&entries, ResourceKind::Volume, None);
        assert_eq!(volume.unit, UnitType::Monthly);
        assert!((volume.monthly.net - 0.044).abs() < 1e-12);
        assert!(entries
            .iter()
            .all(|e| e.kind != ResourceKind::Snapshot || e.location.is_none()));
    }

    #[test]
    fn test_invalid_amount_is_decode_error() {
        let body = PRICING.replace("\"20.0000000000\"", "\"twenty\"");
        let parsed: PricingResponse = decode("/pricing", &body).unwrap();
        assert!(matches!(
            parsed.pricing.into_entries(),
            Err(ProviderError::Decode { .. })
        ));
    }

    #[test]
    fn test_missing_traffic_price_skips_traffic_kinds() {
        let body = PRICING.replace("\"traffic\":", "\"unrelated\":");
        assert!(!body.contains("\"traffic\""));
        let parsed: PricingResponse = decode("/pricing", &body).unwrap();
        let entries = parsed.pricing.into_entries().unwrap();

        assert!(entries.iter().all(|e| e.kind != ResourceKind::InstanceTraffic
            && e.kind != ResourceKind::LoadBalancerTraffic));
        assert!(entries.iter().any(|e| e.kind == ResourceKind::ComputeInstance));
        assert!(entries.iter().any(|e| e.kind == ResourceKind::Volume));
    }

    #[test]
    fn test_unexpected_shape_is_decode_error() {
        let result: Result<PricingResponse, _> = decode("/pricing", r#"{"prices": []}"#);
        assert!(matches!(result, Err(ProviderError::Decode { .. })));
    }

    #[test]
    fn test_server_page_maps_backup_and_traffic() {
        let body = r#"{
          "servers": [
            {"id": 1, "name": "web-1", "created": "2024-01-01T00:00:00+00:00",
             "server_type": {"name": "cx22"},
             "datacenter": {"location": {"name": "fsn1"}},
             "backup_window": "22-02",
             "outgoing_traffic": 3000000000000, "included_traffic": 1000000000000},
            {"id": 2, "name": "db-1", "created": "2024-01-01T00:00:00+00:00",
             "server_type": {"name": "cx32"},
             "datacenter": {"location": {"name": "nbg1"}},
             "backup_window": null,
             "outgoing_traffic": null, "included_traffic": 1000000000000}
          ],
          "meta": {"pagination": {"page": 1, "next_page": null}}
        }"#;

        let page: Page<ApiServer> = decode("/servers", body).unwrap();
        let backups = servers_as(ResourceKind::Backup, page.items);
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].name, "web-1");

        let page: Page<ApiServer> = decode("/servers", body).unwrap();
        let traffic = servers_as(ResourceKind::InstanceTraffic, page.items);
        assert!((traffic[0].quantity - 2.0).abs() < 1e-12);
        assert_eq!(traffic[1].quantity, 0.0);
    }

    #[test]
    fn test_snapshot_uses_description_and_size() {
        let body = r#"{
          "images": [
            {"id": 9, "description": "nightly", "image_size": 2.5,
             "created": "2024-03-01T12:00:00+00:00", "type": "snapshot"}
          ],
          "meta": {"pagination": {"page": 1, "next_page": null}}
        }"#;
        let page: Page<ApiImage> = decode("/images", body).unwrap();
        let snapshot = page.items.into_iter().next().unwrap().into_resource();
        assert_eq!(snapshot.name, "nightly");
        assert_eq!(snapshot.quantity, 2.5);
        assert_eq!(snapshot.location, None);
    }
}
