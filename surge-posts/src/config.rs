use std::{fmt, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use surge::{StagePlan, plan::Stage};

use crate::payload::DEFAULT_AUTHOR;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_LATENCY_THRESHOLD: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
/// Upper bound on any stage target; every virtual user is a task.
pub const MAX_VUS: u64 = 1_000_000;
/// Upper bound on the summed stage durations of a plan (one year).
pub const MAX_PLAN_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Ramp up to 60 users, climb to 100, ramp down to 0.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(30), 60),
        Stage::new(Duration::from_secs(60), 100),
        Stage::new(Duration::from_secs(30), 0),
    ]
}

/// Which create-post route of the service to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    /// Publish the post through Kafka
    #[default]
    WithKafka,
    /// Write the post straight to the database
    WithoutKafka,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::WithKafka => "/api/create-post-with-kafka",
            Self::WithoutKafka => "/api/create-post-without-kafka",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "surge-posts",
    about = "Staged HTTP load test for the create-post endpoint"
)]
pub struct Cli {
    /// YAML scenario file. Flags and environment variables take precedence over it.
    #[arg(long, env = "SURGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scheme, host and port of the service
    #[arg(long, env = "SURGE_BASE_URL")]
    pub base_url: Option<String>,
    #[arg(long, value_enum, env = "SURGE_ENDPOINT")]
    pub endpoint: Option<Endpoint>,
    /// Value of the `author` field in every post
    #[arg(long, env = "SURGE_AUTHOR")]
    pub author: Option<String>,

    /// Ramp stage as `<duration>:<target users>`, e.g. `30s:60`. Repeatable.
    #[arg(
        long = "stage",
        env = "SURGE_STAGES",
        value_delimiter = ',',
        conflicts_with_all = ["vus", "duration"]
    )]
    pub stages: Vec<Stage>,
    /// Users active when the first stage starts
    #[arg(long, env = "SURGE_START_VUS")]
    pub start_vus: Option<u64>,
    /// Constant load: this many users for `--duration`
    #[arg(long, env = "SURGE_VUS", requires = "duration")]
    pub vus: Option<u64>,
    #[arg(long, env = "SURGE_DURATION", value_parser = humantime::parse_duration, requires = "vus")]
    pub duration: Option<Duration>,

    /// Responses at or above this latency fail the latency check
    #[arg(long, env = "SURGE_LATENCY_THRESHOLD", value_parser = humantime::parse_duration)]
    pub latency_threshold: Option<Duration>,
    /// Per-request timeout
    #[arg(long, env = "SURGE_TIMEOUT", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
    /// How long in-flight requests may finish once the last stage is over
    #[arg(long, env = "SURGE_GRACEFUL_STOP", value_parser = humantime::parse_duration)]
    pub graceful_stop: Option<Duration>,
    /// Granularity of the virtual-user ramp
    #[arg(long, env = "SURGE_TICK", value_parser = humantime::parse_duration)]
    pub tick: Option<Duration>,

    /// Print the report as JSON
    #[arg(long, env = "SURGE_JSON")]
    pub json: bool,
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "SURGE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Optional scenario file; every field falls back to flags or built-in defaults.
///
/// ```yaml
/// base_url: http://localhost:3000
/// endpoint: without-kafka
/// latency_threshold: 150ms
/// stages:
///   - { duration: 30s, target: 60 }
///   - { duration: 1m, target: 100 }
///   - { duration: 30s, target: 0 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub base_url: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub author: Option<String>,
    pub start_vus: Option<u64>,
    pub stages: Option<Vec<Stage>>,
    #[serde(default, deserialize_with = "opt_duration")]
    pub latency_threshold: Option<Duration>,
    #[serde(default, deserialize_with = "opt_duration")]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "opt_duration")]
    pub graceful_stop: Option<Duration>,
    #[serde(default, deserialize_with = "opt_duration")]
    pub tick: Option<Duration>,
}

impl ScenarioFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid scenario file")
    }
}

fn opt_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Fully resolved and validated run configuration.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub url: Url,
    pub endpoint: Endpoint,
    pub author: String,
    pub plan: StagePlan,
    pub latency_threshold: Duration,
    pub timeout: Duration,
    pub graceful_stop: Duration,
    pub tick: Duration,
    pub json: bool,
}

impl LoadTestConfig {
    /// Layer `cli` over `file` over the built-in defaults, then validate.
    pub fn resolve(cli: Cli, file: ScenarioFile) -> Result<Self> {
        let plan = match (cli.vus, cli.duration) {
            (Some(vus), Some(duration)) => {
                if vus == 0 {
                    bail!("--vus must be greater than 0");
                }
                StagePlan::constant(vus, duration)
            }
            _ => {
                let stages = if !cli.stages.is_empty() {
                    cli.stages
                } else {
                    file.stages.unwrap_or_else(default_stages)
                };
                let start_vus = cli.start_vus.or(file.start_vus).unwrap_or(0);
                StagePlan::with_start_vus(start_vus, stages)
            }
        };
        if plan.max_target() > MAX_VUS {
            bail!(
                "stage plan asks for {} virtual users, the maximum is {MAX_VUS}",
                plan.max_target()
            );
        }

        match plan.total_duration() {
            Some(total) if total <= MAX_PLAN_DURATION => {}
            _ => bail!(
                "stage plan runs longer than the maximum of {}",
                humantime::format_duration(MAX_PLAN_DURATION)
            ),
        }

        let endpoint = cli.endpoint.or(file.endpoint).unwrap_or_default();
        let base_url = cli
            .base_url
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base = Url::parse(&base_url).with_context(|| format!("invalid base url `{base_url}`"))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("base url `{base_url}` must use http or https");
        }
        let url = base
            .join(endpoint.path())
            .with_context(|| format!("cannot append `{endpoint}` to `{base_url}`"))?;

        let latency_threshold = cli
            .latency_threshold
            .or(file.latency_threshold)
            .unwrap_or(DEFAULT_LATENCY_THRESHOLD);
        if latency_threshold.is_zero() {
            bail!("--latency-threshold must be greater than 0");
        }
        let timeout = cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            bail!("--timeout must be greater than 0");
        }
        let tick = cli.tick.or(file.tick).unwrap_or(DEFAULT_TICK);
        if tick.is_zero() {
            bail!("--tick must be greater than 0");
        }
        let graceful_stop = cli
            .graceful_stop
            .or(file.graceful_stop)
            .unwrap_or(DEFAULT_GRACEFUL_STOP);

        Ok(Self {
            url,
            endpoint,
            author: cli
                .author
                .or(file.author)
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            plan,
            latency_threshold,
            timeout,
            graceful_stop,
            tick,
            json: cli.json,
        })
    }
}

impl TryFrom<Cli> for LoadTestConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read scenario file `{}`", path.display()))?;
                ScenarioFile::from_yaml(&raw)
                    .with_context(|| format!("failed to load scenario file `{}`", path.display()))?
            }
            None => ScenarioFile::default(),
        };
        Self::resolve(cli, file)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("surge-posts").chain(args.iter().copied()))
            .expect("cli should parse")
    }

    #[test]
    fn defaults_match_the_original_scenario() {
        let cfg = LoadTestConfig::resolve(cli(&[]), ScenarioFile::default()).unwrap();

        assert_eq!(
            cfg.url.as_str(),
            "http://localhost:3000/api/create-post-with-kafka"
        );
        assert_eq!(cfg.author, "sounish");
        assert_eq!(cfg.plan.stages(), default_stages().as_slice());
        assert_eq!(cfg.plan.start_vus(), 0);
        assert_eq!(cfg.latency_threshold, Duration::from_millis(200));
        assert!(!cfg.json);
    }

    #[test]
    fn stages_from_flags() {
        let cfg = LoadTestConfig::resolve(
            cli(&["--stage", "5s:10", "--stage", "10s:0", "--endpoint", "without-kafka"]),
            ScenarioFile::default(),
        )
        .unwrap();

        assert_eq!(
            cfg.plan.stages(),
            &[
                Stage::new(Duration::from_secs(5), 10),
                Stage::new(Duration::from_secs(10), 0),
            ]
        );
        assert_eq!(cfg.url.path(), "/api/create-post-without-kafka");
    }

    #[test]
    fn comma_separated_stages() {
        let cfg =
            LoadTestConfig::resolve(cli(&["--stage", "1s:1,2s:2"]), ScenarioFile::default())
                .unwrap();
        assert_eq!(cfg.plan.stages().len(), 2);
    }

    #[test]
    fn constant_load_shortcut() {
        let cfg = LoadTestConfig::resolve(
            cli(&["--vus", "7", "--duration", "1m"]),
            ScenarioFile::default(),
        )
        .unwrap();

        assert_eq!(cfg.plan, StagePlan::constant(7, Duration::from_secs(60)));
    }

    #[test]
    fn malformed_stages_fail_at_parse_time() {
        for bad in ["30s:lots", "30s:-5", "forever:10", "30s"] {
            assert!(
                Cli::try_parse_from(["surge-posts", "--stage", bad]).is_err(),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn stages_and_vus_conflict() {
        assert!(
            Cli::try_parse_from([
                "surge-posts",
                "--stage",
                "1s:1",
                "--vus",
                "2",
                "--duration",
                "1s"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["surge-posts", "--vus", "2"]).is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        let err = LoadTestConfig::resolve(
            cli(&["--base-url", "ftp://example.com"]),
            ScenarioFile::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("http or https"));

        let err = LoadTestConfig::resolve(
            cli(&["--latency-threshold", "0s"]),
            ScenarioFile::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("--latency-threshold"));

        let err = LoadTestConfig::resolve(
            cli(&["--vus", "0", "--duration", "1s"]),
            ScenarioFile::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("--vus"));

        let err = LoadTestConfig::resolve(cli(&["--stage", "1s:2000000"]), ScenarioFile::default())
            .unwrap_err();
        assert!(err.to_string().contains("maximum"));
    }

    #[test]
    fn overlong_plans_are_rejected() {
        for args in [
            &["--stage", "400000000000y:1", "--stage", "400000000000y:1"][..],
            &["--stage", "400000000000y:1"][..],
            &["--vus", "1", "--duration", "2years"][..],
        ] {
            let err = LoadTestConfig::resolve(cli(args), ScenarioFile::default()).unwrap_err();
            assert!(err.to_string().contains("runs longer than"), "{args:?}: {err}");
        }

        let file = ScenarioFile::from_yaml("stages:\n  - { duration: 400000000000y, target: 1 }")
            .unwrap();
        assert!(LoadTestConfig::resolve(cli(&[]), file).is_err());

        let cfg = LoadTestConfig::resolve(cli(&["--stage", "365days:1"]), ScenarioFile::default())
            .unwrap();
        assert_eq!(cfg.plan.total_duration(), Some(MAX_PLAN_DURATION));
    }

    #[test]
    fn file_fills_in_and_flags_win() {
        let file = ScenarioFile::from_yaml(
            "
base_url: http://posts.internal:8080
author: file-author
latency_threshold: 150ms
stages:
  - { duration: 2s, target: 3 }
",
        )
        .unwrap();

        let cfg = LoadTestConfig::resolve(cli(&["--author", "flag-author"]), file).unwrap();
        assert_eq!(
            cfg.url.as_str(),
            "http://posts.internal:8080/api/create-post-with-kafka"
        );
        assert_eq!(cfg.author, "flag-author");
        assert_eq!(cfg.latency_threshold, Duration::from_millis(150));
        assert_eq!(cfg.plan.stages(), &[Stage::new(Duration::from_secs(2), 3)]);
    }

    #[test]
    fn empty_stage_list_in_file_is_accepted() {
        let file = ScenarioFile::from_yaml("stages: []").unwrap();
        let cfg = LoadTestConfig::resolve(cli(&[]), file).unwrap();
        assert!(cfg.plan.is_empty());
    }

    #[test]
    fn malformed_file_is_rejected() {
        assert!(ScenarioFile::from_yaml("stages:\n  - { duration: -1, target: 3 }").is_err());
        assert!(ScenarioFile::from_yaml("stages:\n  - { duration: 1s, target: many }").is_err());
        assert!(ScenarioFile::from_yaml("latency_threshold: quick").is_err());
        assert!(ScenarioFile::from_yaml("unknown_key: 1").is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let cli = cli(&["--config", "/definitely/not/here.yaml"]);
        let err = LoadTestConfig::try_from(cli).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read scenario file"));
    }
}
