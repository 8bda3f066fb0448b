use anyhow::Result;
use revmon_alert::RunRequest;
use revmon_storage::RuleStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use revmon_server::app;
use revmon_server::bootstrap;
use revmon_server::config::ServerConfig;
use revmon_server::rule_seed;
use revmon_server::scheduler::AlertRunScheduler;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  revmon-server [config.toml]                                        Start the server");
    eprintln!("  revmon-server run-alerts <config.toml> [--rule-id ID] [--dry-run]  Run alert rules once and print the report");
    eprintln!("  revmon-server init-rules <config.toml> <seed.json>                 Initialize alert rules from seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("revmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("run-alerts") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("run-alerts requires <config.toml> argument")
            })?;
            let request = parse_run_flags(&args[3..]).inspect_err(|_| print_usage())?;
            run_alerts_once(config_path, request).await
        }
        Some("init-rules") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-rules requires <seed.json> argument")
            })?;
            run_init_rules(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn parse_run_flags(flags: &[String]) -> Result<RunRequest> {
    let mut request = RunRequest::default();
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--dry-run" => request.dry_run = true,
            "--rule-id" => {
                let id = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--rule-id requires a value"))?;
                request.rule_id = Some(id.clone());
            }
            other => anyhow::bail!("unknown flag '{other}'"),
        }
    }
    Ok(request)
}

/// Runs the rules once and prints the report as JSON on stdout.
#[allow(clippy::print_stdout)]
async fn run_alerts_once(config_path: &str, request: RunRequest) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    bootstrap::init_ids(&config)?;
    let store = Arc::new(bootstrap::open_store(&config).await?);
    let provider = bootstrap::build_metrics_provider(&config, &store).await?;
    let state = bootstrap::build_state(config, store, provider, None);

    let report = state.runner.run(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_init_rules(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    bootstrap::init_ids(&config)?;
    let store = bootstrap::open_store(&config).await?;
    let seed = rule_seed::load_seed_file(seed_path)?;
    rule_seed::seed_rules(&store, &seed).await?;
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        db = %config.database.redacted_url(),
        metrics_provider = %config.metrics.provider,
        scheduler = config.scheduler.enabled,
        "revmon-server starting"
    );
    bootstrap::init_ids(&config)?;
    if config.runner_secret().is_none() {
        tracing::warn!(
            "No runner_secret configured. POST /v1/internal/alerts/run will reject every call."
        );
    }

    let alert_store = Arc::new(bootstrap::open_store(&config).await?);
    let provider = bootstrap::build_metrics_provider(&config, &alert_store).await?;
    let llm = bootstrap::build_llm_client(&config)?;
    let store: Arc<dyn RuleStore> = alert_store;
    let state = bootstrap::build_state(config.clone(), store, provider, llm);

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state.clone());
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app);

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = AlertRunScheduler::new(
            state.runner.clone(),
            Duration::from_secs(config.scheduler.interval_secs),
        );
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        tracing::info!("Alert run scheduler disabled");
        None
    };

    tracing::info!(http = %http_addr, "Server started");

    if let Err(e) = http_server
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(h) = scheduler_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
