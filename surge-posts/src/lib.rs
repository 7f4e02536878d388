//! Staged load test for the create-post endpoint of the posts service.
//!
//! Every virtual user posts a freshly randomized blog post, then checks that the
//! service answered `200` under the latency threshold. The number of virtual
//! users follows a [`StagePlan`](surge::StagePlan), by default ramping to 60,
//! climbing to 100 and ramping back to 0 over two minutes.

pub mod config;
pub mod iteration;
pub mod payload;
pub mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use surge::{
    RampingVusExecutor, Reporter, Scenario,
    aggregate::HttpAggregate,
    check::{self, CheckSet},
    report::{HttpReport, JsonReporter, StdoutReporter},
};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use config::{Cli, Endpoint, LoadTestConfig, LogFormat};
pub use iteration::Iteration;
pub use payload::{PostGenerator, PostPayload, PostRequest};
pub use transport::{HttpTransport, Transport, TransportError};

/// The two checks every response is held to.
pub fn default_checks(config: &LoadTestConfig) -> CheckSet {
    CheckSet::new()
        .with(check::status_is(200))
        .with(check::latency_under(config.latency_threshold))
}

/// Run the whole stage plan against the configured endpoint.
///
/// Cancelling `cancel` ends the run early; whatever was collected so far is
/// still reported.
pub async fn run_load_test(config: &LoadTestConfig, cancel: CancellationToken) -> Result<HttpReport> {
    let transport = HttpTransport::new(config.timeout).context("failed to build HTTP client")?;
    let checks = default_checks(config);
    let check_names: Vec<&str> = checks.names().collect();
    tracing::info!(
        "Load testing {} for {} with checks: {}",
        config.url,
        config
            .plan
            .total_duration()
            .map(|d| humantime::format_duration(d).to_string())
            .unwrap_or_else(|| "an unbounded time".to_string()),
        check_names.join(", ")
    );
    let iteration = Arc::new(Iteration::new(
        PostGenerator::new(config.url.clone(), config.author.clone()),
        transport,
        checks,
    ));

    let scenario = Scenario::<HttpAggregate, _, _>::builder()
        .name(format!("POST {}", config.url))
        .action(move || {
            let iteration = iteration.clone();
            async move { iteration.run_once().await }
        })
        .build();

    let executor = RampingVusExecutor::builder()
        .plan(config.plan.clone())
        .tick(config.tick)
        .graceful_stop(config.graceful_stop)
        .cancel(cancel)
        .build();

    let started = Instant::now();
    let aggregate = scenario.run(&executor).await.context("load test run failed")?;
    Ok(HttpReport::from(aggregate).with_elapsed(started.elapsed()))
}

/// Why a command-line run ended without a written report.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),
    #[error("run failed: {0:#}")]
    Run(anyhow::Error),
    #[error("failed to write report: {0}")]
    Report(#[from] surge::Error),
}

impl Failure {
    /// Process exit code: 2 for bad configuration, 1 for anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Run(_) | Self::Report(_) => 1,
        }
    }
}

/// Resolve `cli`, run the load test and print the report to stdout.
pub async fn run_cli(cli: Cli, cancel: CancellationToken) -> Result<HttpReport, Failure> {
    let config = LoadTestConfig::try_from(cli).map_err(Failure::Config)?;
    let report = run_load_test(&config, cancel).await.map_err(Failure::Run)?;
    if config.json {
        JsonReporter.report(&report).await?;
    } else {
        StdoutReporter.report(&report).await?;
    }
    Ok(report)
}
