//! Stage plans: how many virtual users should be active over time.
//!
//! A [`StagePlan`] is an ordered list of [`Stage`]s. Each stage names a
//! duration and the virtual-user concurrency to reach by the end of it. The
//! executor interpolates linearly between the previous target and the next,
//! so `[30s:60, 1m:100, 30s:0]` ramps up to 60 users, climbs to 100, then
//! drains back to zero.
//!
//! Plans are built once at startup and never change afterwards. An empty plan
//! is valid and produces no load at all.
use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// One ramp window of a [`StagePlan`].
///
/// `Stage::new(Duration::from_secs(30), 60)` ramps from whatever the previous
/// stage ended at to 60 virtual users over 30 seconds. A stage with
/// `Duration::ZERO` jumps to its target instantly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub duration: Duration,
    /// Virtual users
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Reasons a `<duration>:<target>` stage string can be rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseStageError {
    #[error("stage `{0}` must look like `<duration>:<target>`, e.g. `30s:60`")]
    MissingSeparator(String),
    #[error("stage `{input}` has an invalid duration: {reason}")]
    Duration { input: String, reason: String },
    #[error("stage `{0}` has an invalid target: expected a non-negative whole number of users")]
    Target(String),
}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (duration, target) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseStageError::MissingSeparator(s.to_string()))?;

        let duration = humantime::parse_duration(duration.trim()).map_err(|e| {
            ParseStageError::Duration {
                input: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        let target = target
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseStageError::Target(s.to_string()))?;

        Ok(Self { duration, target })
    }
}

/// Ordered sequence of ramp stages, immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    /// Concurrency the first stage ramps from.
    #[serde(default)]
    start_vus: u64,
    #[serde(default)]
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            start_vus: 0,
            stages,
        }
    }

    /// Same as [`StagePlan::new`] but ramping from `start_vus` instead of zero.
    pub fn with_start_vus(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    /// A plan that jumps straight to `vus` and holds them for `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self::with_start_vus(vus, vec![Stage::new(duration, vus)])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_vus(&self) -> u64 {
        self.start_vus
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sum of all stage durations, `None` if it does not fit in a [`Duration`].
    pub fn total_duration(&self) -> Option<Duration> {
        self.stages
            .iter()
            .try_fold(Duration::ZERO, |total, s| total.checked_add(s.duration))
    }

    /// Highest concurrency the plan ever asks for.
    ///
    /// This is how many virtual-user slots an executor has to provision. An
    /// empty plan never runs, so it needs none regardless of `start_vus`.
    pub fn max_target(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u64::max)
    }
}

impl From<Vec<Stage>> for StagePlan {
    fn from(stages: Vec<Stage>) -> Self {
        Self::new(stages)
    }
}

impl fmt::Display for StagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(empty)");
        }
        let stages: Vec<String> = self.stages.iter().map(Stage::to_string).collect();
        write!(f, "start={} [{}]", self.start_vus, stages.join(", "))
    }
}

fn serialize_duration<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&humantime::format_duration(*d).to_string())
}

/// Accepts `"30s"`-style strings or a plain number of seconds.
fn deserialize_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    struct V;

    impl serde::de::Visitor<'_> for V {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as `30s`, or a non-negative number of seconds")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("stage duration must not be negative, got {v}")))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Duration, E> {
            if !v.is_finite() || v < 0.0 {
                return Err(E::custom(format!(
                    "stage duration must be a non-negative, finite number, got {v}"
                )));
            }
            Ok(Duration::from_secs_f64(v))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Duration, E> {
            humantime::parse_duration(v).map_err(E::custom)
        }
    }

    d.deserialize_any(V)
}
