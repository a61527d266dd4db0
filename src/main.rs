use anyhow::Result;
use tracing::{error, info};

use cluster_signal::{execute_run, load_config, SegmentSink};

#[tokio::main]
async fn main() -> Result<()> {
    let (cfg, issues) = load_config()?;
    init_tracing(cfg.verbose || cfg.is_test());

    // Config problems are logged; the run proceeds with what was loaded
    for issue in &issues {
        error!("{}", issue);
    }
    if !cfg.enabled {
        info!("signal is disabled, exiting");
        return Ok(());
    }
    info!("cluster-signal {} ({} variant)", env!("CARGO_PKG_VERSION"), cfg.variant);

    let sink = SegmentSink::new(cfg.segment_key.clone(), cfg.segment_url.clone());
    execute_run(&cfg, &sink).await?;

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
