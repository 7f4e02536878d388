//! Named predicates evaluated against every response.
//!
//! A [`CheckSet`] is the assertion list of a scenario. Evaluating it never
//! short-circuits: every check runs and reports its own outcome, so a slow
//! `500` shows up as one failure of each check instead of a single opaque
//! failed iteration.
use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

/// What a check gets to see of a received response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    /// Round trip, from sending the request to reading the last body byte.
    pub latency: Duration,
    pub bytes: u64,
}

type Predicate = dyn Fn(&ResponseInfo) -> bool + Send + Sync;

/// A named boolean predicate over a [`ResponseInfo`].
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Check {
    pub fn new<F>(name: impl Into<Arc<str>>, predicate: F) -> Self
    where
        F: Fn(&ResponseInfo) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, response: &ResponseInfo) -> CheckOutcome {
        CheckOutcome {
            name: Arc::clone(&self.name),
            passed: (self.predicate)(response),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// `status is <code>`
pub fn status_is(code: u16) -> Check {
    Check::new(format!("status is {code}"), move |r| r.status == code)
}

/// `response time is less than <threshold>`, strictly less.
pub fn latency_under(threshold: Duration) -> Check {
    Check::new(
        format!(
            "response time is less than {}",
            humantime::format_duration(threshold)
        ),
        move |r| r.latency < threshold,
    )
}

/// The result of one check against one response.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Ordered collection of checks, evaluated together.
#[derive(Clone, Debug, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(Check::name)
    }

    pub fn evaluate(&self, response: &ResponseInfo) -> CheckResults {
        CheckResults(self.checks.iter().map(|c| c.evaluate(response)).collect())
    }
}

impl FromIterator<Check> for CheckSet {
    fn from_iter<I: IntoIterator<Item = Check>>(iter: I) -> Self {
        Self {
            checks: iter.into_iter().collect(),
        }
    }
}

/// Per-check outcomes of a single evaluation, in check order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckResults(Vec<CheckOutcome>);

impl CheckResults {
    /// Outcome of the check called `name`, if it was evaluated.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0
            .iter()
            .find(|o| &*o.name == name)
            .map(|o| o.passed)
    }

    pub fn all_passed(&self) -> bool {
        self.0.iter().all(|o| o.passed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<CheckOutcome> {
        self.0
    }
}
