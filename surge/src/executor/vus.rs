use tokio::sync::watch::{self, Receiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use super::Executor;
use crate::{aggregate::Aggregate, error::Error, plan::StagePlan, scenario::Scenario};
use internals::*;

use futures::future::join_all;
use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Lower bound for the governor tick, so a zero tick cannot spin.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Executor that keeps a [`StagePlan`]'s worth of virtual users busy.
///
/// - One worker task per virtual-user slot, `plan.max_target()` in total.
/// - A governor ticks every `tick` and publishes the interpolated number of users
///   that should be active. Slot `i` iterates while that number is above `i`.
/// - Once the plan is over, or `cancel` fires, no new iteration starts and
///   in-flight iterations get `graceful_stop` to complete before being abandoned.
///
/// ```rust, ignore
/// use surge::{StagePlan, executor::RampingVusExecutor, plan::Stage};
///
/// let executor = RampingVusExecutor::builder()
///     .plan(StagePlan::new(vec![
///         Stage::new(Duration::from_secs(30), 60),
///         Stage::new(Duration::from_secs(60), 100),
///         Stage::new(Duration::from_secs(30), 0),
///     ]))
///     .build();
/// let results = scenario.run(&executor).await?;
/// ```
#[derive(TypedBuilder)]
pub struct RampingVusExecutor {
    /// How many virtual users should be active over time.
    pub plan: StagePlan,
    /// The granularity of the governor's updates.
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    /// How long in-flight iterations may keep running once the plan is over.
    #[builder(default = Duration::from_secs(30))]
    pub graceful_stop: Duration,
    /// Stops the run early; the merged aggregate is still returned.
    #[builder(default)]
    pub cancel: CancellationToken,
}

impl<A, F, Fut> Executor<A, F, Fut> for RampingVusExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario<A, F, Fut>) -> Result<A, Self::Error> {
        let started = Instant::now();
        let slots = self.plan.max_target();
        if slots == 0 {
            tracing::info!(
                "Stage plan {} requests no virtual users, nothing to run for {}",
                self.plan,
                scenario.name
            );
            return Ok(A::new());
        }

        let (active_tx, state_tx, ctx) = ExecutionContext::new();

        tracing::info!("Spawning {slots} virtual users...");
        let handles = spawn_workers(ctx.clone(), slots, scenario.action.clone());

        tracing::info!("Running scenario: {} with plan {}", scenario.name, self.plan);
        let mut governor = tokio::spawn(vu_governor_task(
            active_tx,
            self.plan.clone(),
            self.tick.max(MIN_TICK),
        ));

        tokio::select! {
            res = &mut governor => res?,
            _ = self.cancel.cancelled() => {
                tracing::warn!("Run cancelled, stopping {} early...", scenario.name);
                governor.abort();
            }
        }

        tracing::info!("Stages finished, draining in-flight iterations...");
        state_tx.send_replace(RunState::Draining);

        let mut workers = pin!(join_all(handles));
        let results = tokio::select! {
            results = &mut workers => results,
            _ = tokio::time::sleep(self.graceful_stop) => {
                tracing::warn!(
                    "Graceful stop of {} elapsed, abandoning in-flight iterations",
                    humantime::format_duration(self.graceful_stop)
                );
                state_tx.send_replace(RunState::Aborted);
                workers.await
            }
        };

        tracing::info!("Processing results...");
        let mut final_agg = A::new();
        for res in results {
            match res {
                Ok(agg) => final_agg.merge(agg),
                Err(e) => tracing::error!("Virtual user panicked with error: {e}"),
            }
        }

        let interrupted = ctx.interrupted.load(Ordering::Relaxed);
        if interrupted > 0 {
            tracing::warn!("{interrupted} in-flight iterations were interrupted");
        }

        tracing::info!(
            "Done running scenario: {} in {}",
            scenario.name,
            humantime::format_duration(Duration::from_millis(
                started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
            ))
        );
        Ok(final_agg)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Internal components of the `RampingVusExecutor`.
/// Encapsulated in a module to allow conditional exposure via `#[cfg(feature = "internals")]`.
mod internals {
    use super::*;
    use tokio::sync::watch::Sender;

    /// Lifecycle of a run, broadcast to every worker.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum RunState {
        /// Workers iterate while their slot is active.
        Running,
        /// No new iterations; in-flight ones may finish.
        Draining,
        /// In-flight iterations are dropped.
        Aborted,
    }

    /// Shared state for the governor and all workers.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Number of virtual users that should be active right now.
        pub active: Receiver<u64>,
        pub state: Receiver<RunState>,
        /// Iterations dropped by an abort.
        pub interrupted: Arc<AtomicU64>,
    }

    impl ExecutionContext {
        pub fn new() -> (Sender<u64>, Sender<RunState>, Self) {
            let (active_tx, active) = watch::channel(0);
            let (state_tx, state) = watch::channel(RunState::Running);
            (
                active_tx,
                state_tx,
                Self {
                    active,
                    state,
                    interrupted: Arc::new(AtomicU64::new(0)),
                },
            )
        }
    }

    /// Governor task that publishes the number of active virtual users,
    /// following the stages of `plan`.
    pub async fn vu_governor_task(active: Sender<u64>, plan: StagePlan, tick: Duration) {
        let mut current = plan.start_vus();
        publish(&active, current);

        let n = plan.stages().len();
        for (i, stage) in plan.stages().iter().enumerate() {
            tracing::info!("Starting stage {}/{n}: {stage}", i + 1);
            // Instantly jump to the target.
            if stage.duration.is_zero() {
                current = stage.target;
                publish(&active, current);
                continue;
            }

            let stage_start = Instant::now();
            // `None` when the stage ends past what `Instant` can represent.
            let stage_end = stage_start.checked_add(stage.duration);
            let mut next_tick = stage_start;
            let start_vus = current;

            loop {
                let elapsed = Instant::now().duration_since(stage_start);
                if elapsed >= stage.duration {
                    break;
                }
                publish(
                    &active,
                    calc_active_vus(elapsed, stage.duration, start_vus, stage.target),
                );
                next_tick += tick;
                let wake = match stage_end {
                    Some(end) => next_tick.min(end),
                    None => next_tick,
                };
                tokio::time::sleep_until(wake).await;
            }
            // Land exactly on the target so the next stage ramps from it.
            current = stage.target;
            publish(&active, current);

            tracing::info!("Finished stage {}/{n}", i + 1);
        }
        tracing::debug!("Governor finished all stages.");
    }

    fn publish(active: &Sender<u64>, vus: u64) {
        active.send_if_modified(|current| {
            if *current == vus {
                return false;
            }
            tracing::debug!("Active virtual users: {current} -> {vus}");
            *current = vus;
            true
        });
    }

    /// Pure function computing how many virtual users should be active
    /// `elapsed` into a stage ramping from `start` to `end` over `stage_duration`.
    pub fn calc_active_vus(elapsed: Duration, stage_duration: Duration, start: u64, end: u64) -> u64 {
        if stage_duration.is_zero() {
            return end;
        }
        // Interpolation factor [0.0..1.0]
        let t = (elapsed.as_secs_f64() / stage_duration.as_secs_f64()).min(1.0);
        let vus = start as f64 + (end as f64 - start as f64) * t;
        // Float to int casts saturate, negatives become 0.
        vus.round() as u64
    }

    /// Spawns one worker task per virtual-user slot.
    ///
    /// Worker `vu` iterates while more than `vu` users are active, parks otherwise,
    /// and returns its local aggregate once the run drains.
    pub fn spawn_workers<A, F, Fut>(ctx: ExecutionContext, slots: u64, action: F) -> Vec<JoinHandle<A>>
    where
        A: Aggregate + 'static,
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send + 'static,
    {
        (0..slots)
            .map(|vu| {
                let mut ctx = ctx.clone();
                let action = action.clone();
                tokio::spawn(async move {
                    let mut agg = A::new();
                    tracing::debug!("VU {vu} spawned.");

                    loop {
                        tokio::select! {
                            biased;
                            _ = draining(&mut ctx.state) => break,
                            ok = until_active(&mut ctx.active, vu) => {
                                if !ok {
                                    break;
                                }
                            }
                        }

                        tokio::select! {
                            metric = action() => agg.consume(&metric),
                            _ = aborted(&mut ctx.state) => {
                                ctx.interrupted.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                        }
                    }

                    tracing::debug!("VU {vu} shutting down.");
                    agg
                })
            })
            .collect()
    }

    /// Resolves once slot `vu` is inside the active window. `false` means the
    /// governor is gone and the slot will never be activated again.
    async fn until_active(active: &mut Receiver<u64>, vu: u64) -> bool {
        active.wait_for(|n| *n > vu).await.is_ok()
    }

    async fn draining(state: &mut Receiver<RunState>) {
        let _ = state.wait_for(|s| *s != RunState::Running).await;
    }

    async fn aborted(state: &mut Receiver<RunState>) {
        let _ = state.wait_for(|s| *s == RunState::Aborted).await;
    }
}
