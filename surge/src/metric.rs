use std::fmt::Debug;

use serde::{Serialize, de::DeserializeOwned};

/// A `Metric` is a single observation produced by one iteration of a scenario's action.
///
/// Metrics are the most granular level of data the engine handles: latency, the
/// outcome of checks, transport errors, bytes moved. They are folded into an
/// [`crate::Aggregate`] by the worker that produced them and are never shared
/// between workers.
///
/// ## Example
/// ```rust
/// use surge::Metric;
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Clone, Debug, PartialOrd, PartialEq, Serialize, Deserialize)]
/// struct MyMetric {
///     latency: Duration,
///     success: bool,
/// }
/// impl Metric for MyMetric {}
/// ```
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use std::{fmt, time::Duration};

    use serde::Deserialize;

    use super::*;
    use crate::check::{CheckOutcome, CheckResults, ResponseInfo};

    /// Why an iteration produced no response at all.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(rename_all = "snake_case")]
    pub enum ErrorKind {
        /// The request did not complete within the client timeout.
        Timeout,
        /// Connection refused, reset, or the host did not resolve.
        Connect,
        /// The request could not be built or sent.
        Request,
        /// The status line arrived but reading the body failed.
        Body,
    }

    impl ErrorKind {
        pub const ALL: [ErrorKind; 4] = [Self::Timeout, Self::Connect, Self::Request, Self::Body];

        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Timeout => "timeout",
                Self::Connect => "connect",
                Self::Request => "request",
                Self::Body => "body",
            }
        }
    }

    impl fmt::Display for ErrorKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// One HTTP iteration: either a response with its check outcomes, or a
    /// transport error. Checks are only evaluated when a response arrived.
    #[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
    pub struct HttpSample {
        pub latency: Duration,
        pub status: Option<u16>,
        pub bytes: u64,
        pub checks: Vec<CheckOutcome>,
        pub error: Option<ErrorKind>,
    }

    impl Metric for HttpSample {}

    impl HttpSample {
        pub fn response(response: ResponseInfo, checks: CheckResults) -> Self {
            Self {
                latency: response.latency,
                status: Some(response.status),
                bytes: response.bytes,
                checks: checks.into_inner(),
                error: None,
            }
        }

        pub fn failed(latency: Duration, kind: ErrorKind) -> Self {
            Self {
                latency,
                status: None,
                bytes: 0,
                checks: Vec::new(),
                error: Some(kind),
            }
        }

        pub fn is_error(&self) -> bool {
            self.error.is_some()
        }
    }
}
