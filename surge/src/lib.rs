//! Surge: a small staged load-generation engine.
//!
//! Surge runs a scenario's action from many concurrent virtual users, ramping
//! their number up and down along a [`StagePlan`], and folds what every
//! iteration observed into a report.
//!
//! # Architecture
//!
//! - [`StagePlan`]: ordered `(duration, target users)` stages, fixed at startup.
//! - [`Scenario`]: a name plus the action one virtual user runs per iteration.
//! - [`Executor`]: runs the scenario. [`RampingVusExecutor`] follows a stage plan
//!   with a governor task and one worker task per virtual-user slot.
//! - [`Metric`]: what one iteration returns.
//! - [`Aggregate`]: per-worker accumulator of metrics, merged at the end of a run.
//! - [`Report`]: final statistics derived from an aggregate.
//! - [`Reporter`]: writes a report somewhere (stdout, JSON).
//! - [`check`]: named predicates evaluated against every response, each counted
//!   on its own.
//!
//! # Example
//!
//! ```rust, ignore
//! use std::time::{Duration, Instant};
//!
//! use surge::{
//!     Reporter, Scenario, StagePlan,
//!     aggregate::HttpAggregate,
//!     check::{self, CheckSet, ResponseInfo},
//!     executor::RampingVusExecutor,
//!     metric::{ErrorKind, HttpSample},
//!     plan::Stage,
//!     report::{HttpReport, StdoutReporter},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = reqwest::Client::new();
//!     let checks = CheckSet::new().with(check::status_is(200));
//!
//!     let scenario = Scenario::<HttpAggregate, _, _>::builder()
//!         .name("GET /")
//!         .action(move || {
//!             let client = client.clone();
//!             let checks = checks.clone();
//!             async move {
//!                 let start = Instant::now();
//!                 match client.get("http://localhost:3000").send().await {
//!                     Ok(r) => {
//!                         let info = ResponseInfo {
//!                             status: r.status().as_u16(),
//!                             latency: start.elapsed(),
//!                             bytes: 0,
//!                         };
//!                         HttpSample::response(info, checks.evaluate(&info))
//!                     }
//!                     Err(_) => HttpSample::failed(start.elapsed(), ErrorKind::Request),
//!                 }
//!             }
//!         })
//!         .build();
//!
//!     let executor = RampingVusExecutor::builder()
//!         .plan(StagePlan::new(vec![
//!             Stage::new(Duration::from_secs(10), 20),
//!             Stage::new(Duration::from_secs(10), 0),
//!         ]))
//!         .build();
//!
//!     let results = scenario.run(&executor).await.unwrap();
//!     StdoutReporter.report(&HttpReport::from(results)).await.unwrap();
//! }
//! ```
//!
//! # Feature flags
//!
//! - `builtins`: HTTP-oriented implementations ([`metric::HttpSample`],
//!   [`aggregate::HttpAggregate`], [`report::HttpReport`], stdout and JSON
//!   reporters). Enabled by default.
//! - `internals`: exposes the executor's governor and worker functions.

/// Metric aggregators
pub mod aggregate;
/// Named response checks
pub mod check;
/// Error types
pub mod error;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Single metrics
pub mod metric;
/// Virtual-user stage plans
pub mod plan;
/// Reports and Reporters
pub mod report;
/// What to run
pub mod scenario;

pub use aggregate::Aggregate;
pub use error::Error;
pub use executor::{Executor, RampingVusExecutor};
pub use metric::Metric;
pub use plan::StagePlan;
pub use report::{Report, Reporter};
pub use scenario::Scenario;
