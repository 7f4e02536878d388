use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::future::Future;

use crate::{Aggregate, error::Result};

/// A [`Report`] is the processed form of an [`Aggregate`].
///
/// Reports turn raw counters and histograms into the numbers people read:
/// pass rates, percentiles, throughput. They are plain data with no I/O, built
/// from an aggregate through [`From<A>`], and handed to a [`Reporter`] for output.
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs the side effects:
/// printing it, writing it to a file, shipping it somewhere.
///
/// # Example
/// ```rust
/// use surge::{Aggregate, Report, Reporter};
///
/// struct DebugReporter;
/// impl<A: Aggregate, R: Report<A>> Reporter<A, R> for DebugReporter {
///     async fn report(&self, report: &R) -> surge::error::Result<()> {
///         println!("{report:?}");
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<()>>;
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::{collections::BTreeMap, fmt::Write as _, io::Write as _, time::Duration};

    use serde::Deserialize;

    use super::*;
    use crate::aggregate::{CheckTally, HttpAggregate};

    /// Latency distribution of received responses, in milliseconds.
    #[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
    pub struct LatencySummary {
        pub min_ms: f64,
        pub mean_ms: f64,
        pub p50_ms: f64,
        pub p90_ms: f64,
        pub p95_ms: f64,
        pub p99_ms: f64,
        pub max_ms: f64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CheckSummary {
        pub passes: u64,
        pub fails: u64,
        /// Percentage of evaluations that passed, `0.0` when never evaluated.
        pub pass_rate: f64,
    }

    impl From<CheckTally> for CheckSummary {
        fn from(tally: CheckTally) -> Self {
            Self {
                passes: tally.passes,
                fails: tally.fails,
                pass_rate: percent(tally.passes, tally.total()),
            }
        }
    }

    /// Final summary of an HTTP run.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct HttpReport {
        pub iterations: u64,
        pub responses: u64,
        pub errors: u64,
        pub errors_by_kind: BTreeMap<String, u64>,
        pub status_codes: BTreeMap<u16, u64>,
        pub checks: BTreeMap<String, CheckSummary>,
        pub bytes_received: u64,
        /// `None` when no response was ever received.
        pub latency: Option<LatencySummary>,
        /// Wall-clock time of the run, when known.
        #[serde(default, with = "humantime_serde_opt")]
        pub elapsed: Option<Duration>,
        pub iterations_per_sec: Option<f64>,
    }

    impl HttpReport {
        /// Attach the wall-clock duration of the run and derive throughput.
        pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
            self.elapsed = Some(elapsed);
            self.iterations_per_sec = (!elapsed.is_zero())
                .then(|| self.iterations as f64 / elapsed.as_secs_f64());
            self
        }

        /// True when every check passed every time and no transport error occurred.
        pub fn all_passed(&self) -> bool {
            self.errors == 0 && self.checks.values().all(|c| c.fails == 0)
        }

        pub fn human_summary(&self) -> String {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "status: {}",
                if self.all_passed() { "PASS" } else { "FAIL" }
            );
            match (self.elapsed, self.iterations_per_sec) {
                (Some(elapsed), Some(rate)) => {
                    let _ = writeln!(
                        out,
                        "iterations: {} in {} ({rate:.2}/s)",
                        self.iterations,
                        humantime::format_duration(round_to_millis(elapsed)),
                    );
                }
                _ => {
                    let _ = writeln!(out, "iterations: {}", self.iterations);
                }
            }
            let _ = writeln!(
                out,
                "responses: {} | bytes received: {}",
                self.responses, self.bytes_received
            );

            let by_kind: Vec<String> = self
                .errors_by_kind
                .iter()
                .map(|(kind, n)| format!("{kind}={n}"))
                .collect();
            if by_kind.is_empty() {
                let _ = writeln!(out, "errors: {}", self.errors);
            } else {
                let _ = writeln!(out, "errors: {} ({})", self.errors, by_kind.join(", "));
            }

            if !self.status_codes.is_empty() {
                let codes: Vec<String> = self
                    .status_codes
                    .iter()
                    .map(|(code, n)| format!("{code}={n}"))
                    .collect();
                let _ = writeln!(out, "status codes: {}", codes.join(", "));
            }

            if let Some(l) = &self.latency {
                let _ = writeln!(
                    out,
                    "latency: min={:.2}ms mean={:.2}ms p50={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
                    l.min_ms, l.mean_ms, l.p50_ms, l.p90_ms, l.p95_ms, l.p99_ms, l.max_ms
                );
            }

            for (name, check) in &self.checks {
                let _ = writeln!(
                    out,
                    "check [{}] {name}: {:.2}% ({} passed, {} failed)",
                    if check.fails == 0 { "PASS" } else { "FAIL" },
                    check.pass_rate,
                    check.passes,
                    check.fails
                );
            }
            out
        }
    }

    impl From<HttpAggregate> for HttpReport {
        fn from(agg: HttpAggregate) -> Self {
            let h = &agg.latency_us;
            let latency = (!h.is_empty()).then(|| LatencySummary {
                min_ms: us_to_ms(h.min() as f64),
                mean_ms: us_to_ms(h.mean()),
                p50_ms: us_to_ms(h.value_at_quantile(0.50) as f64),
                p90_ms: us_to_ms(h.value_at_quantile(0.90) as f64),
                p95_ms: us_to_ms(h.value_at_quantile(0.95) as f64),
                p99_ms: us_to_ms(h.value_at_quantile(0.99) as f64),
                max_ms: us_to_ms(h.max() as f64),
            });

            Self {
                iterations: agg.iterations,
                responses: agg.responses(),
                errors: agg.error_count(),
                errors_by_kind: agg
                    .errors
                    .iter()
                    .map(|(kind, n)| (kind.to_string(), *n))
                    .collect(),
                status_codes: agg.status_codes.clone(),
                checks: agg
                    .checks
                    .iter()
                    .map(|(name, tally)| (name.to_string(), CheckSummary::from(*tally)))
                    .collect(),
                bytes_received: agg.bytes_received,
                latency,
                elapsed: None,
                iterations_per_sec: None,
            }
        }
    }

    impl Report<HttpAggregate> for HttpReport {}

    /// Prints the human-readable summary to stdout.
    pub struct StdoutReporter;

    impl Reporter<HttpAggregate, HttpReport> for StdoutReporter {
        async fn report(&self, report: &HttpReport) -> Result<()> {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(report.human_summary().as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }

    /// Prints the report as pretty JSON to stdout.
    pub struct JsonReporter;

    impl Reporter<HttpAggregate, HttpReport> for JsonReporter {
        async fn report(&self, report: &HttpReport) -> Result<()> {
            let json = serde_json::to_string_pretty(report)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
            Ok(())
        }
    }

    fn percent(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            part as f64 / total as f64 * 100.0
        }
    }

    fn us_to_ms(us: f64) -> f64 {
        us / 1_000.0
    }

    fn round_to_millis(d: Duration) -> Duration {
        Duration::from_millis(d.as_millis().try_into().unwrap_or(u64::MAX))
    }

    mod humantime_serde_opt {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::{
            Aggregate,
            check::CheckOutcome,
            metric::{ErrorKind, HttpSample},
        };

        fn sample(millis: u64, status: u16) -> HttpSample {
            HttpSample {
                latency: Duration::from_millis(millis),
                status: Some(status),
                bytes: 2,
                checks: vec![CheckOutcome {
                    name: "status is 200".into(),
                    passed: status == 200,
                }],
                error: None,
            }
        }

        #[test]
        fn empty_aggregate_gives_zeroed_report() {
            let report = HttpReport::from(HttpAggregate::new());

            assert_eq!(report.iterations, 0);
            assert_eq!(report.responses, 0);
            assert_eq!(report.errors, 0);
            assert!(report.checks.is_empty());
            assert!(report.latency.is_none());
            assert!(report.all_passed());
            assert!(report.human_summary().contains("iterations: 0"));
        }

        #[test]
        fn percentiles_follow_the_samples() {
            let mut agg = HttpAggregate::new();
            for millis in 1..=100 {
                agg.consume(&sample(millis, 200));
            }
            let report = HttpReport::from(agg);
            let latency = report.latency.unwrap();

            assert!((latency.min_ms - 1.0).abs() < 0.01);
            assert!((latency.p50_ms - 50.0).abs() < 0.1);
            assert!((latency.p99_ms - 99.0).abs() < 0.1);
            assert!((latency.max_ms - 100.0).abs() < 0.1);
            assert!((latency.mean_ms - 50.5).abs() < 0.1);
        }

        #[test]
        fn failures_are_individually_visible() {
            let mut agg = HttpAggregate::new();
            agg.consume(&sample(1, 200));
            agg.consume(&sample(1, 500));
            agg.consume(&HttpSample::failed(Duration::ZERO, ErrorKind::Timeout));
            let report = HttpReport::from(agg);

            assert_eq!(report.iterations, 3);
            assert_eq!(report.errors, 1);
            assert_eq!(report.errors_by_kind["timeout"], 1);
            let check = &report.checks["status is 200"];
            assert_eq!((check.passes, check.fails), (1, 1));
            assert!((check.pass_rate - 50.0).abs() < f64::EPSILON);
            assert!(!report.all_passed());

            let summary = report.human_summary();
            assert!(summary.contains("status: FAIL"));
            assert!(summary.contains("check [FAIL] status is 200"));
            assert!(summary.contains("timeout=1"));
        }

        #[test]
        fn throughput_needs_elapsed_time() {
            let mut agg = HttpAggregate::new();
            for _ in 0..10 {
                agg.consume(&sample(1, 200));
            }
            let report = HttpReport::from(agg);
            assert_eq!(report.iterations_per_sec, None);

            let report = report.with_elapsed(Duration::from_secs(2));
            assert_eq!(report.iterations_per_sec, Some(5.0));
            assert!(report.human_summary().contains("(5.00/s)"));

            let zero = HttpReport::from(HttpAggregate::new()).with_elapsed(Duration::ZERO);
            assert_eq!(zero.iterations_per_sec, None);
        }

        #[test]
        fn json_report_shape() {
            let mut agg = HttpAggregate::new();
            agg.consume(&sample(3, 200));
            let report = HttpReport::from(agg).with_elapsed(Duration::from_millis(1500));

            let value = serde_json::to_value(&report).unwrap();
            assert_eq!(value["iterations"], 1);
            assert_eq!(value["elapsed"], "1s 500ms");
            assert_eq!(value["checks"]["status is 200"]["passes"], 1);

            let back: HttpReport = serde_json::from_value(value).unwrap();
            assert_eq!(back.elapsed, Some(Duration::from_millis(1500)));
            assert_eq!(back.status_codes, report.status_codes);
        }
    }
}
