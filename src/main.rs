use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use jet_image_tagger::{client, source, Config, LabelList, OutputLog, TwoPhaseExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Everything below must succeed before the first event is touched.
    let cfg = Config::from_env().context("invalid configuration")?;
    let labels = LabelList::load(&cfg.label_list_path).context("cannot start without labels")?;
    let output = OutputLog::open(&cfg.output_log_path).with_context(|| {
        format!("failed to open output log {}", cfg.output_log_path.display())
    })?;
    let client = client::from_config(&cfg.client, cfg.grid_size, cfg.channels, cfg.inference_timeout)
        .context("failed to set up inference client")?;
    let events = source::open_all(cfg.events_paths.as_slice()).context("failed to open event files")?;

    tracing::info!(
        grid = cfg.grid_size,
        top_n = cfg.top_n,
        collection = %cfg.input_collection_id,
        streams = cfg.streams,
        files = cfg.events_paths.len(),
        max_events = ?cfg.max_events,
        labels = labels.len(),
        "starting"
    );

    let exec = TwoPhaseExecutor::from_config(&cfg, Arc::new(labels), Arc::new(output));
    let summary = exec
        .run(events, client.as_ref(), cfg.streams, cfg.max_events)
        .await?;

    tracing::info!(done = summary.done, failed = summary.failed, "finished");
    Ok(())
}
