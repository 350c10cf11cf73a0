//! CLI command implementations
//!
//! One-shot commands build a fresh pipeline from the config (seed state,
//! empty stores), run, drain follow-up jobs and print JSON. `serve` runs
//! the HTTP API, the job worker and the nightly schedule until Ctrl-C.

use std::path::Path;

use tokio::sync::watch;

use super::args::{Command, TargetArgs, VerbosityArg};
use super::errors::{CliError, CliResult};
use super::io::write_response;
use crate::config::FactlineConfig;
use crate::context::RequestContext;
use crate::errors::FactlineError;
use crate::explain::ExplainRequest;
use crate::gateway::prompts::list_templates;
use crate::gateway::Verbosity;
use crate::http_server::HttpServer;
use crate::observability;
use crate::pipeline::Pipeline;

/// Main CLI entry point; the only function main.rs calls.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    observability::init_tracing(cli.json_logs);
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Recompute { config, target } => recompute(&config, &target),
        Command::Explain {
            config,
            target,
            audience,
            verbosity,
        } => explain(&config, &target, audience, verbosity),
        Command::PrintConfig { config } => print_config(&config),
        Command::Templates => write_response(&list_templates()),
    }
}

fn failed<E: Into<FactlineError>>(e: E) -> CliError {
    CliError::from(e.into())
}

fn load_config(path: &Path) -> CliResult<FactlineConfig> {
    FactlineConfig::load_or_default(path).map_err(|e| CliError::config_error(e.to_string()))
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

fn context_for(target: &TargetArgs) -> CliResult<RequestContext> {
    let mut ctx = RequestContext::new(&target.tenant)
        .map_err(failed)?
        .with_roles(target.roles.clone());
    if let Some(actor) = &target.actor {
        ctx = ctx.with_actor(actor);
    }
    Ok(ctx)
}

impl From<VerbosityArg> for Verbosity {
    fn from(v: VerbosityArg) -> Self {
        match v {
            VerbosityArg::Short => Verbosity::Short,
            VerbosityArg::Standard => Verbosity::Standard,
            VerbosityArg::Detailed => Verbosity::Detailed,
        }
    }
}

/// Serve the API with the worker and schedule until Ctrl-C
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    let rt = runtime()?;
    rt.block_on(async move {
        let pipeline = Pipeline::from_config(&config).map_err(|e| CliError::boot_failed(e.to_string()))?;
        let schedule = pipeline.refresh_schedule(&config).map_err(failed)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = pipeline.runner.clone();
        let runner_rx = shutdown_rx.clone();
        let worker = tokio::spawn(async move { runner.run(runner_rx).await });

        let producer = pipeline.producer.clone();
        let schedule_rx = shutdown_rx.clone();
        let scheduler = tokio::spawn(async move {
            if let Err(e) = schedule.run(producer, schedule_rx).await {
                tracing::error!(error = %e, "refresh schedule stopped");
            }
        });

        let server = HttpServer::new(config.http.clone(), pipeline);
        let mut server_rx = shutdown_rx;
        let ctrl_c = async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = server_rx.changed() => {}
            }
        };

        let served = server.start(ctrl_c).await;
        // stop the worker and schedule whichever way the server ended
        let _ = shutdown_tx.send(true);
        let _ = tokio::join!(worker, scheduler);
        served.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Recompute one entity, drain follow-up jobs, print the outcome
pub fn recompute(config_path: &Path, target: &TargetArgs) -> CliResult<()> {
    let config = load_config(config_path)?;
    let ctx = context_for(target)?;
    let entity = target.entity_query().to_entity().map_err(failed)?;

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let pipeline = Pipeline::from_config(&config).map_err(failed)?;
        let outcome = pipeline.recomputer.recompute(&ctx, &entity).await.map_err(failed)?;
        let jobs = pipeline.runner.drain().await.map_err(failed)?;
        tracing::info!(jobs, "follow-up jobs processed");
        Ok::<_, CliError>(outcome)
    })?;

    write_response(&outcome)
}

/// Compute facts for one entity and explain them
pub fn explain(
    config_path: &Path,
    target: &TargetArgs,
    audience: Option<String>,
    verbosity: VerbosityArg,
) -> CliResult<()> {
    let config = load_config(config_path)?;
    let ctx = context_for(target)?;
    let entity = target.entity_query().to_entity().map_err(failed)?;

    let rt = runtime()?;
    let response = rt.block_on(async {
        let pipeline = Pipeline::from_config(&config).map_err(failed)?;
        let outcome = pipeline.facts.compute(&ctx, &entity).await.map_err(failed)?;

        let mut req = ExplainRequest::new(entity)
            .with_fact_hash(outcome.snapshot.fact_hash)
            .with_verbosity(verbosity.into());
        req.audience = audience;
        pipeline.explain.explain(&ctx, req).await.map_err(failed)
    })?;

    write_response(&response)
}

/// Print the configuration after defaults are applied
pub fn print_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    config.validate().map_err(|e| CliError::config_error(e.to_string()))?;
    write_response(&config)
}
