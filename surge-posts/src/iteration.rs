use surge::{check::CheckSet, metric::HttpSample};

use crate::{
    payload::{PostGenerator, PostRequest},
    transport::Transport,
};

/// One virtual-user iteration: generate a request, send it, check the response.
///
/// Shared read-only by every virtual user; iterations keep no state between runs.
#[derive(Debug)]
pub struct Iteration<T> {
    pub generator: PostGenerator,
    pub transport: T,
    pub checks: CheckSet,
}

impl<T: Transport> Iteration<T> {
    pub fn new(generator: PostGenerator, transport: T, checks: CheckSet) -> Self {
        Self {
            generator,
            transport,
            checks,
        }
    }

    /// Send `request` and turn whatever happens into a sample. Transport errors
    /// are recorded as such; checks only run against real responses.
    pub async fn run(&self, request: PostRequest) -> HttpSample {
        match self.transport.send(request).await {
            Ok(response) => HttpSample::response(response, self.checks.evaluate(&response)),
            Err(e) => {
                tracing::debug!("Request failed: {e}");
                HttpSample::failed(e.elapsed, e.kind)
            }
        }
    }

    /// Generate a fresh request with the thread-local generator and run it.
    pub async fn run_once(&self) -> HttpSample {
        let request = self.generator.generate(&mut rand::rng());
        self.run(request).await
    }
}
