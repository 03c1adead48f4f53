use governor::{Quota, RateLimiter};
use inventory_collector_lib::{
    cli::{parse_args, Cli},
    cloud_client::{
        CloudApiClient, GlobalRateLimiter, HttpRawFetcher, HttpScopeSource, RawFetcher,
        RetryPolicy, ScopeSource, StaticScopeSource,
    },
    collector::{self, CollectorConfig, CycleOrchestrator, RunMode, Scheduler},
    config::Config,
    logging::{format_error_report, init_logging},
    normalizer,
    registry::{default_entity_types, Domain, EntityTypeRegistry, RegistryError},
    server::{register_metrics, setup_server_with_addr},
    sink::{HttpInventorySink, InventorySink, MemoryInventorySink},
    state::AppState,
};
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancels `shutdown_token` when a SIGTERM or SIGINT signal is received.
async fn handle_shutdown_signals(shutdown_token: CancellationToken) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(err), _) | (_, Err(err)) => {
                error!(event = "signal_handler_failed", error = %err, "cannot watch shutdown signals");
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, finishing current cycle");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, finishing current cycle");
        }
    }

    shutdown_token.cancel();
}

fn build_registry(
    args: &Cli,
    fetchers: Vec<(Domain, Arc<dyn RawFetcher>)>,
) -> Result<EntityTypeRegistry, RegistryError> {
    let types = default_entity_types();
    let tags: Vec<String> = types.iter().map(|entity| entity.tag().to_string()).collect();

    let mut builder = normalizer::register_defaults(
        EntityTypeRegistry::builder(),
        tags.iter().map(String::as_str),
    )
    .entity_types(types);
    for (domain, fetcher) in fetchers {
        builder = builder.fetcher(domain, fetcher);
    }
    for batch_limit in &args.batch_limits {
        builder = builder.override_batch_limit(&batch_limit.tag, batch_limit.limit);
    }
    if !args.entity_types.is_empty() {
        builder = builder.only_top_level(args.entity_types.iter().cloned());
    }
    builder.build()
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args = parse_args();
    let mode_name = if args.once { "single_shot" } else { "continuous" };
    let logging_context = init_logging("inventory_collector", mode_name, &args.log_level);
    let run_span = tracing::info_span!(
        "collector_run",
        service = %logging_context.service,
        environment = %logging_context.environment,
        mode = %logging_context.mode,
        run_id = %logging_context.run_id
    );
    let _run_guard = run_span.enter();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config_invalid", error = %err, "configuration is invalid");
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let cloud_client = match CloudApiClient::new(
        &config.cloud_api_url,
        config.cloud_api_token.as_deref(),
        config.http_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("failed to build cloud API client: {err}");
            std::process::exit(2);
        }
    };
    let rate_limiter: GlobalRateLimiter = Arc::new(RateLimiter::direct(Quota::per_second(
        config.cloud_requests_per_second,
    )));

    let fetchers: Vec<(Domain, Arc<dyn RawFetcher>)> = Domain::all()
        .into_iter()
        .map(|domain| {
            let fetcher: Arc<dyn RawFetcher> = Arc::new(HttpRawFetcher::new(
                cloud_client.clone(),
                domain,
                rate_limiter.clone(),
                RetryPolicy::default(),
            ));
            (domain, fetcher)
        })
        .collect();

    let registry = match build_registry(&args, fetchers) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            let err = collector::Error::from(err);
            error!(
                event = "registry_invalid",
                error = %format_error_report(&err),
                "entity type registry failed to resolve"
            );
            eprintln!("{}", format_error_report(&err));
            std::process::exit(2);
        }
    };

    let scopes: Arc<dyn ScopeSource> = match &config.scopes {
        Some(ids) => Arc::new(StaticScopeSource::from_ids(ids.iter().cloned())),
        None => Arc::new(HttpScopeSource::new(
            cloud_client.clone(),
            rate_limiter.clone(),
            RetryPolicy::default(),
        )),
    };

    let mut memory_sink = None;
    let sink: Arc<dyn InventorySink> = if args.dry_run {
        let sink = Arc::new(MemoryInventorySink::new());
        memory_sink = Some(sink.clone());
        sink
    } else {
        let url = match config.require_inventory_api_url() {
            Ok(url) => url,
            Err(err) => {
                eprintln!("{err} (or pass --dry-run)");
                std::process::exit(2);
            }
        };
        let sink = match HttpInventorySink::new(
            url,
            config.inventory_api_token.as_deref(),
            config.http_timeout,
        ) {
            Ok(sink) => sink,
            Err(err) => {
                eprintln!("failed to build inventory store client: {err}");
                std::process::exit(2);
            }
        };
        match config.inventory_max_records_per_request {
            Some(limit) => Arc::new(sink.with_max_records_per_request(limit)),
            None => Arc::new(sink),
        }
    };

    let state = Arc::new(AppState::new(CancellationToken::new()));
    let metrics = register_metrics(&state).await;
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.shutdown_token.clone()));

    let server_handle = if args.no_metrics_server {
        None
    } else {
        match setup_server_with_addr(state.clone(), config.metrics_addr).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(
                    event = "metrics_server_bind_failed",
                    addr = %config.metrics_addr,
                    error = %err,
                    "continuing without metrics server"
                );
                None
            }
        }
    };

    let collector_config = CollectorConfig {
        poll_interval: args
            .poll_interval
            .map(Duration::from_secs)
            .unwrap_or(config.poll_interval),
        mode: if args.once {
            RunMode::SingleShot
        } else {
            RunMode::Continuous
        },
    };
    info!(
        event = "collector_starting",
        entity_types = registry.top_level_types().count(),
        poll_interval_secs = collector_config.poll_interval.as_secs(),
        dry_run = args.dry_run,
        "starting inventory collector"
    );

    let orchestrator = CycleOrchestrator::new(registry, scopes, sink, metrics.clone());
    let mut scheduler = Scheduler::new(
        orchestrator,
        collector_config,
        metrics,
        state.shutdown_token.clone(),
    );
    let report = scheduler.run().await;

    if let Some(sink) = memory_sink {
        info!(
            event = "dry_run_inventory",
            active = ?sink.active_counts(),
            "dry run inventory held in memory"
        );
    }

    state.shutdown_token.cancel();
    shutdown_handle.abort();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    if collector_config.mode == RunMode::SingleShot && report.had_failures() {
        error!(
            event = "collector_failed",
            cycles_failed = report.cycles_failed,
            "single-shot run finished with failed cycles"
        );
        std::process::exit(1);
    }

    info!(event = "collector_stopped", passes = report.passes, "inventory collector stopped");
}
