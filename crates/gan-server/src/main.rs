use anyhow::{Context, Result};
use clap::Parser;
use gan_audit::{validate_availability, AuditEngine, AuditEngineConfig};
use gan_config::GanConfig;
use gan_env::ExecutableResolver;
use gan_process::ProcessManager;
use gan_server::handler::{HandlerConfig, RequestHandler};
use gan_server::scheduler::spawn_session_reaper;
use gan_server::transport::run_stdio_server;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod cli;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep stdout reserved for JSON-RPC framing; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("cannot determine process cwd")?;
    let working_dir = gan_env::resolve_working_directory(None, &cwd)
        .map_err(|diag| anyhow::anyhow!("{}", diag.message))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| working_dir.join(".gan").join("config.toml"));
    let config = GanConfig::load(&config_path).context("loading configuration")?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config).context("rendering configuration")?);
        return Ok(());
    }

    if !config.enabled || !config.enable_gan_auditing {
        tracing::warn!("gan auditing is disabled by configuration; serving a no-op MCP endpoint");
    }

    let resolver = ExecutableResolver::new(config.executable_candidates.clone());
    let process = ProcessManager::new(config.max_concurrent_audits as usize)
        .with_max_output_bytes(config.max_output_bytes);

    // Fail fast: refuse to start serving if the external CLI is not usable (§4.C, §6.5).
    let executable = resolver
        .resolve()
        .map_err(|diag| anyhow::anyhow!("startup availability check failed: {}", diag.message))?;
    let validation = validate_availability(
        &process,
        &executable,
        &config.version_probe_arg,
        &config.min_version,
        &working_dir,
        Duration::from_millis(config.version_probe_timeout_ms),
    )
    .await;
    if !validation.available {
        for issue in &validation.environment_issues {
            tracing::error!(issue, "startup availability check failed");
        }
        anyhow::bail!(
            "external code-analysis CLI failed the startup availability check: {}",
            validation.environment_issues.join("; ")
        );
    }
    tracing::info!(version = ?validation.version, "external code-analysis CLI validated");

    let audit_engine = Arc::new(AuditEngine::new(
        resolver,
        process,
        AuditEngineConfig {
            enabled: config.enable_gan_auditing,
            subcommand: config.audit_subcommand.clone(),
            timeout: Duration::from_millis(config.audit_timeout_ms),
            default_rubric: gan_core::default_rubric(),
            preserve_env_vars: config.preserve_env_vars.clone(),
        },
    ));

    let session_store = Arc::new(
        gan_session::SessionStore::new(config.state_directory.clone()).context("initializing session store")?,
    );

    let handler = Arc::new(RequestHandler::new(
        audit_engine.clone(),
        session_store.clone(),
        HandlerConfig {
            synchronous: config.synchronous_mode,
            thought_history_cap: config.thought_history_cap,
            stagnation_threshold: config.stagnation_threshold,
            completion_tiers: config.completion_tiers(),
            kill_switches: gan_eval::KillSwitchConfig {
                max_iterations: config.max_iterations,
                stagnation_start_loop: config.stagnation_start_loop,
                critical_persistence_start_loop: config.critical_persistence_start_loop,
            },
        },
    ));

    let shutdown = CancellationToken::new();

    let reaper = spawn_session_reaper(
        session_store,
        Duration::from_secs(config.session_cleanup_interval_secs),
        chrono::Duration::seconds(config.max_session_age_secs as i64),
        shutdown.clone(),
    );

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            ctrlc_token.cancel();
        }
    });

    let result = run_stdio_server(handler, shutdown.clone()).await;

    shutdown.cancel();
    let _ = reaper.await;
    audit_engine.terminate_all().await;

    result
}
