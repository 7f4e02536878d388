//! Executor: how a `Scenario` is actually run.
//!
//! The `Executor` trait is the runtime hook that executes a `Scenario`. The
//! built-in [`RampingVusExecutor`] follows a [`StagePlan`](crate::StagePlan): it
//! keeps a number of virtual users busy and moves that number linearly from
//! stage to stage.
//!
//! # High-level flow
//! 1. One worker task is spawned per virtual-user slot, up to the highest
//!    concurrency the plan ever asks for.
//! 2. A governor task walks the stages. Every `tick` it computes how many users
//!    should be active right now and publishes that number on a `watch` channel.
//! 3. Worker `i` runs iterations while the active count is greater than `i`.
//!    When the count drops below it, the worker finishes the iteration in flight
//!    and parks until it is needed again.
//! 4. Every iteration calls the scenario `action()`, producing a `Metric` that
//!    the worker folds into its own `Aggregate`.
//! 5. When the plan is over (or the run is cancelled) the executor drains: no new
//!    iterations start, in-flight ones get `graceful_stop` to finish, then they are
//!    abandoned. Worker aggregates are merged into the result.
//!
//! # Interpolation
//! For a stage ramping from `start` users to `end` users over `duration`, the
//! target at time `elapsed` into the stage is:
//!
//! ```text
//! t = min(elapsed / duration, 1)
//! vus(t) = round(start + (end - start) * t)
//! ```
//!
//! A zero-length stage jumps to its target immediately.
//!
//! # Tuning knobs
//! - `tick`: granularity of governor updates. Smaller ticks follow the ramp more
//!   closely at the cost of more wakeups. Typical values: 50–250ms.
//! - `graceful_stop`: how long in-flight iterations may run once the plan is over.
//!
//! # Common pitfalls
//! - **Do not block inside the action.** Use async clients; a blocking call stalls
//!   the runtime thread and every virtual user scheduled on it.
//! - **Do not build clients inside the action.** Connection pools only help when
//!   they are shared.
pub mod vus;
pub use vus::RampingVusExecutor;

use crate::{aggregate::Aggregate, scenario::Scenario};

/// The runtime hook that executes a `Scenario`.
///
/// Generic over the aggregate, action and future types so any metric pipeline can
/// run on any executor.
pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    type Error;
    /// Execute the scenario and return the final aggregate.
    fn exec(
        &self,
        scenario: &Scenario<A, F, Fut>,
    ) -> impl Future<Output = Result<A, Self::Error>> + Send;
}
