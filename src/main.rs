use clap::Parser;
use hcloud_pricing_exporter::catalog::PriceCatalog;
use hcloud_pricing_exporter::collectors::CollectorSet;
use hcloud_pricing_exporter::config::Config;
use hcloud_pricing_exporter::provider::{HcloudClient, Provider};
use hcloud_pricing_exporter::{scheduler, server};
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.json_logs);

    let provider: Arc<dyn Provider> = Arc::new(HcloudClient::new(
        config.api_endpoint.clone(),
        config.hcloud_token.clone(),
        config.request_timeout(),
    )?);

    // no prices means every collector fails, so the first sync must succeed
    let catalog = Arc::new(PriceCatalog::new(config.request_timeout()));
    catalog.sync(provider.as_ref()).await?;

    let set = Arc::new(CollectorSet::for_all_kinds(
        catalog.clone(),
        &config.namespace,
        config.request_timeout(),
    )?);
    let registry = Registry::new();
    set.register_all(&registry)?;

    info!(
        collectors = set.len(),
        fetch_interval_secs = config.fetch_interval().as_secs(),
        catalog_refresh_secs = config.catalog_refresh_interval().as_secs(),
        policy = ?config.on_cycle_error,
        "starting exporter"
    );

    let refresh = tokio::spawn(scheduler::run_catalog_refresh_loop(
        catalog,
        provider.clone(),
        config.catalog_refresh_interval(),
    ));

    let fetch_loop = scheduler::run_fetch_loop(
        set,
        provider,
        config.fetch_interval(),
        config.on_cycle_error,
    );

    let result = tokio::select! {
        r = fetch_loop => r.map_err(anyhow::Error::from),
        r = server::serve(config.listen_addr(), registry) => r.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    refresh.abort();
    result
}
