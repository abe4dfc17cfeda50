//! Retry/backoff policy — spec §4.2: "bounded attempts, exponential
//! backoff, last-attempt failure transitions job state to `failed`".
//!
//! No job-type-by-job-type retry table survives in the distilled spec
//! (§9 open question: "precise retry counts per job type beyond
//! MAX_ATTEMPTS=3 for image description... not documented per-type"), so
//! this carries one configurable policy per [`relay_domain::types::JobType`]
//! rather than guessing undocumented per-type numbers; callers needing a
//! different table construct their own [`RetryPolicy`] per type.

use std::time::Duration;

use relay_domain::types::JobType;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Default used when a job type has no explicit policy: 3 attempts,
    /// 1s base delay doubling to a 60s ceiling — the same doubling/60s-cap
    /// shape the cache's database-notification bridge uses for its own
    /// reconnect backoff (spec §4.4).
    pub const fn default_policy() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn for_job_type(job_type: JobType) -> Self {
        match job_type {
            // Image description is the one job type the spec's open
            // questions name an explicit MAX_ATTEMPTS for.
            JobType::ImageDescription => Self { max_attempts: 3, ..Self::default_policy() },
            _ => Self::default_policy(),
        }
    }

    /// Delay before the attempt numbered `attempt` (1-indexed: the first
    /// retry after an initial failure is `attempt = 1`), capped at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Whether a job that just failed on its `attempt`-th try should be
    /// retried (vs. dead-lettered as permanently failed).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
