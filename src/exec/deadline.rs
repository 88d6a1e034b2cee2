// src/exec/deadline.rs

//! A single immutable deadline, computed once per call and passed down.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Saturates at roughly thirty years from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout.min(FAR_FUTURE),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    /// Pick the deadline for one execution.
    ///
    /// Precedence: an explicit request timeout, then the enclosing deadline
    /// (pipeline budget), then the configured default. An explicit timeout
    /// never outlives the enclosing deadline.
    pub fn resolve(
        requested: Option<Duration>,
        enclosing: Option<Deadline>,
        default: Duration,
    ) -> Self {
        match (requested, enclosing) {
            (Some(timeout), Some(outer)) => Deadline::after(timeout).min(outer),
            (Some(timeout), None) => Deadline::after(timeout),
            (None, Some(outer)) => outer,
            (None, None) => Deadline::after(default),
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }
}
