use std::marker::PhantomData;

use typed_builder::TypedBuilder;

use crate::{aggregate::Aggregate, executor::Executor};

/// What to run: a name and the action one virtual user performs per iteration.
///
/// The action is called once per iteration and must build everything it needs
/// from what it captured. Keep heavy objects (HTTP clients, connection pools)
/// outside and clone handles into the closure.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, F, Fut>
where
    A: Aggregate,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    #[builder(default, setter(skip))]
    aggregate: PhantomData<A>,
}

impl<A, F, Fut> Scenario<A, F, Fut>
where
    A: Aggregate,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    /// Run this scenario on `executor` and return the merged aggregate.
    pub async fn run<E>(&self, executor: &E) -> Result<A, E::Error>
    where
        E: Executor<A, F, Fut>,
    {
        executor.exec(self).await
    }
}
