//! The ambient configuration surface.
//!
//! Modeled directly on `loom::model::Builder`: a plain public-field struct
//! with a `new()` that seeds each field from an environment variable (same
//! `env::var(..).map(|v| v.parse().expect(...)).ok()` idiom), renamed into
//! this crate's own namespace.

use std::env;
use std::time::Duration;

const DEFAULT_MAX_BRANCHES: usize = 1_000;

/// Configure a bounded search.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Builder {
    /// Maximum number of nodes the DPOR tree may grow to before the driver
    /// gives up growing it further.
    ///
    /// Defaults to the `SCT_MAX_BRANCHES` environment variable.
    pub max_branches: usize,

    /// Maximum number of driver-loop iterations (distinct executions) to
    /// run.
    ///
    /// Defaults to the `SCT_MAX_ITERATIONS` environment variable.
    pub max_iterations: Option<usize>,

    /// Maximum wall-clock time to spend searching.
    ///
    /// Defaults to the `SCT_MAX_DURATION` environment variable.
    pub max_duration: Option<Duration>,

    /// Pre-emption budget `k` for the bundled pre-emption bound.
    ///
    /// Defaults to the `SCT_PREEMPTION_BOUND` environment variable.
    pub preemption_bound: Option<usize>,
}

impl Builder {
    /// Create a new `Builder` with defaults read from the environment.
    pub fn new() -> Builder {
        let max_branches = env::var("SCT_MAX_BRANCHES")
            .map(|v| v.parse().expect("invalid value for `SCT_MAX_BRANCHES`"))
            .unwrap_or(DEFAULT_MAX_BRANCHES);

        let max_iterations = env::var("SCT_MAX_ITERATIONS")
            .map(|v| v.parse().expect("invalid value for `SCT_MAX_ITERATIONS`"))
            .ok();

        let max_duration = env::var("SCT_MAX_DURATION")
            .map(|v| {
                let secs: u64 = v.parse().expect("invalid value for `SCT_MAX_DURATION`");
                Duration::from_secs(secs)
            })
            .ok();

        let preemption_bound = env::var("SCT_PREEMPTION_BOUND")
            .map(|v| {
                v.parse()
                    .expect("invalid value for `SCT_PREEMPTION_BOUND`")
            })
            .ok();

        Builder {
            max_branches,
            max_iterations,
            max_duration,
            preemption_bound,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}
