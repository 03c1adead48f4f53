use crate::build_info;
use clap::Parser;
use std::num::NonZeroUsize;

#[derive(Parser, Debug)]
#[command(
    about = "Cloud inventory collector",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[arg(long)]
    /// Run one pass over every entity type and exit
    pub once: bool,

    #[arg(long = "poll-interval", value_name = "SECS")]
    /// Seconds to sleep between passes (overrides POLL_INTERVAL_SECS)
    pub poll_interval: Option<u64>,

    #[arg(long = "entity-type", value_name = "TAG")]
    /// Only collect these top-level entity types (repeatable)
    pub entity_types: Vec<String>,

    #[arg(long = "batch-limit", value_name = "TAG=N", value_parser = parse_batch_limit)]
    /// Override an entity type's batch limit (repeatable)
    pub batch_limits: Vec<BatchLimitOverride>,

    #[arg(long)]
    /// Keep inventory in memory instead of uploading it
    pub dry_run: bool,

    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    /// Do not serve /health and /metrics
    pub no_metrics_server: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLimitOverride {
    pub tag: String,
    pub limit: NonZeroUsize,
}

fn parse_batch_limit(raw: &str) -> Result<BatchLimitOverride, String> {
    let (tag, limit) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=N, got {raw:?}"))?;
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(format!("missing entity type in {raw:?}"));
    }
    let limit = limit
        .trim()
        .parse::<NonZeroUsize>()
        .map_err(|err| format!("invalid batch limit in {raw:?}: {err}"))?;
    Ok(BatchLimitOverride {
        tag: tag.to_string(),
        limit,
    })
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
