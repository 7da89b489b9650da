use std::sync::Arc;
use tracing::{error, info};

use sourdough_scout::queries::QueryPlan;
use sourdough_scout::{load_scout_config, DiscoveryPipeline, JsonFileGateway};

/// `--name value` or `--name=value`.
fn arg_value(name: &str) -> Option<String> {
    let flag = format!("--{}", name);
    let prefix = format!("--{}=", name);
    let mut args = std::env::args();
    while let Some(a) = args.next() {
        if a == flag {
            return args.next();
        } else if let Some(rest) = a.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = load_scout_config()?;
    if let Some(city) = arg_value("city") {
        cfg.queries.city = Some(city);
    }
    if let Some(path) = arg_value("store") {
        cfg.store_path = Some(path);
    }

    let store_path = cfg.resolve_store_path();
    let gateway = Arc::new(JsonFileGateway::open(&store_path).await?);

    let pipeline = match DiscoveryPipeline::from_config(&cfg, gateway) {
        Ok(p) => p,
        Err(e) => {
            error!("cannot start: {}", e);
            std::process::exit(2);
        }
    };

    let plan = QueryPlan::from_config(&cfg.queries, cfg.provider.resolve_results_per_query());
    let queries = plan.build();
    if queries.is_empty() {
        anyhow::bail!("no queries to run: configure `queries.terms` or `queries.city`");
    }
    info!(
        queries = queries.len(),
        store = %store_path.display(),
        "starting sourdough-scout"
    );

    let report = pipeline.run(queries).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
