use crate::Metric;
use std::fmt::Debug;

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and combined
/// into an intermediate, mergeable representation.
///
/// **Important:** an `Aggregate` stores counts, sums and histograms; it does not
/// compute final statistics. Averages, percentiles and rates belong in a
/// [`crate::Report`], which is converted from the aggregate once the run is over.
///
/// Every virtual user owns one aggregate and folds its own metrics into it, so
/// `consume` never contends with other workers. When the run ends the executor
/// merges the per-worker aggregates into one.
///
/// # Example
/// ```rust
/// use surge::{Aggregate, Metric};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
/// struct MyMetric(u64);
/// impl Metric for MyMetric {}
///
/// #[derive(Clone, Debug)]
/// struct MyAggregate {
///     count: u64,
///     sum: u128,
/// }
///
/// impl Aggregate for MyAggregate {
///     type Metric = MyMetric;
///
///     fn new() -> Self {
///         Self { count: 0, sum: 0 }
///     }
///
///     fn consume(&mut self, metric: &Self::Metric) {
///         self.count += 1;
///         self.sum += metric.0 as u128;
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.count += other.count;
///         self.sum += other.sum;
///     }
/// }
/// ```
///
/// # Implementor notes
/// - `merge` must be **associative** and **commutative**: worker aggregates are
///   merged in whatever order the workers finish.
/// - `new()` must be the identity of `merge`. A worker that panics is replaced by
///   an empty aggregate.
pub trait Aggregate
where
    Self: Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    use hdrhistogram::Histogram;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::metric::{ErrorKind, HttpSample};

    /// Highest latency the histogram resolves, in microseconds (one hour).
    /// Slower samples are clamped to it.
    pub const MAX_TRACKED_LATENCY_US: u64 = 3_600_000_000;
    const SIGNIFICANT_FIGURES: u8 = 3;

    /// Pass and fail counts of a single named check.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CheckTally {
        pub passes: u64,
        pub fails: u64,
    }

    impl CheckTally {
        pub fn total(&self) -> u64 {
            self.passes + self.fails
        }
    }

    /// Built-in aggregate for [`HttpSample`]s.
    ///
    /// Latencies of received responses go into an HDR histogram (microsecond
    /// resolution, three significant figures) so the report can derive exact-enough
    /// percentiles after merging. Transport errors are only counted by kind; they
    /// carry no latency sample and no check outcomes.
    #[derive(Clone, Debug)]
    pub struct HttpAggregate {
        pub iterations: u64,
        pub errors: BTreeMap<ErrorKind, u64>,
        pub status_codes: BTreeMap<u16, u64>,
        pub checks: BTreeMap<Arc<str>, CheckTally>,
        pub bytes_received: u64,
        pub latency_us: Histogram<u64>,
    }

    impl HttpAggregate {
        pub fn responses(&self) -> u64 {
            self.latency_us.len()
        }

        pub fn error_count(&self) -> u64 {
            self.errors.values().sum()
        }
    }

    impl Aggregate for HttpAggregate {
        type Metric = HttpSample;

        fn new() -> Self {
            Self {
                iterations: 0,
                errors: BTreeMap::new(),
                status_codes: BTreeMap::new(),
                checks: BTreeMap::new(),
                bytes_received: 0,
                latency_us: Histogram::new_with_bounds(
                    1,
                    MAX_TRACKED_LATENCY_US,
                    SIGNIFICANT_FIGURES,
                )
                .expect("constant histogram bounds are valid"),
            }
        }

        fn consume(&mut self, sample: &Self::Metric) {
            self.iterations += 1;

            if let Some(kind) = sample.error {
                *self.errors.entry(kind).or_default() += 1;
                return;
            }

            if let Some(status) = sample.status {
                *self.status_codes.entry(status).or_default() += 1;
            }
            self.bytes_received += sample.bytes;
            self.latency_us.saturating_record(duration_to_us(sample.latency));

            for outcome in &sample.checks {
                let tally = self.checks.entry(Arc::clone(&outcome.name)).or_default();
                if outcome.passed {
                    tally.passes += 1;
                } else {
                    tally.fails += 1;
                }
            }
        }

        fn merge(&mut self, other: Self) {
            self.iterations += other.iterations;
            for (kind, n) in other.errors {
                *self.errors.entry(kind).or_default() += n;
            }
            for (status, n) in other.status_codes {
                *self.status_codes.entry(status).or_default() += n;
            }
            for (name, tally) in other.checks {
                let mine = self.checks.entry(name).or_default();
                mine.passes += tally.passes;
                mine.fails += tally.fails;
            }
            self.bytes_received += other.bytes_received;
            // Both sides share the same bounds, so this cannot go out of range.
            if let Err(e) = self.latency_us.add(&other.latency_us) {
                tracing::warn!("Dropping latency samples while merging aggregates: {e}");
            }
        }
    }

    fn duration_to_us(d: Duration) -> u64 {
        u64::try_from(d.as_micros())
            .unwrap_or(u64::MAX)
            .clamp(1, MAX_TRACKED_LATENCY_US)
    }

}
