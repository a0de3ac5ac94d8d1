use std::time::Duration;

/// Process-wide configuration, loaded once at startup (§6, §10.4).
///
/// `database_url` has no fallback default: a ticket seller must not
/// silently run against a throwaway local file. Every other knob has the
/// literal default named in §6 and can be overridden via environment
/// variables for load testing / staging tuning.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string. Required; no default.
    pub database_url: String,

    // =========================
    // Queue Processor configuration (§4.3, §6)
    // =========================
    /// Period between Processor ticks.
    ///
    /// Purpose:
    /// - bounds how stale "pending work" discovery can be
    /// - too low wastes DB round trips scanning for work that isn't there
    /// - too high adds latency to every buyer's position in the queue
    pub tick_period: Duration,

    /// Max intents drained per event per tick, in strict arrival order.
    ///
    /// Purpose:
    /// - bounds per-tick DB/transaction load per event
    /// - too low under a hot event starves throughput below demand
    /// - too high risks a single hot event monopolizing a tick
    pub batch_size: usize,

    /// Age at which a WAITING intent is expired by the sweeper (or by the
    /// Processor if observed only after claim).
    ///
    /// Purpose:
    /// - bounds how long a buyer waits before being told to retry
    /// - too low expires buyers who would have been served fine
    /// - too high lets abandoned intents occupy queue position indefinitely
    pub intent_expiry: Duration,

    /// Hard wall-clock budget for a single Allocator attempt.
    ///
    /// Purpose:
    /// - prevents one stuck transaction from starving an event's batch
    /// - too low turns ordinary DB latency spikes into false TIMEOUTs
    /// - too high lets one wedged attempt block the rest of the batch
    pub per_intent_timeout: Duration,

    /// Retry budget for CONFLICT / transient Allocator outcomes before an
    /// intent is given up on and marked FAILED.
    ///
    /// Purpose:
    /// - bounds worst-case processing latency per intent
    /// - too low fails intents that would have succeeded on the next retry
    /// - too high lets a contended event retry far past its fair turn
    pub max_attempts: u32,

    /// Period of the bulk expiry sweeper (separate from the per-tick claim
    /// path; it only ever touches WAITING intents).
    pub sweeper_period: Duration,

    /// Display-only per-intent processing estimate used to compute
    /// `estimated_wait_seconds` in Intake and Query Surface responses.
    pub wait_estimate_per_intent: Duration,
}

impl AppConfig {
    /// Loads configuration from the environment.
    ///
    /// Panics if `DATABASE_URL` is unset: there is no sane default
    /// connection string for a service that mutates paid inventory.
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        Self {
            database_url,

            tick_period: Duration::from_millis(env_u64("TICK_PERIOD_MS", 2_000)),
            batch_size: env_u64("BATCH_SIZE", 5) as usize,
            intent_expiry: Duration::from_secs(env_u64("INTENT_EXPIRY_SECS", 30 * 60)),
            per_intent_timeout: Duration::from_secs(env_u64("PER_INTENT_TIMEOUT_SECS", 30)),
            max_attempts: env_u64("MAX_ATTEMPTS", 3) as u32,
            sweeper_period: Duration::from_secs(env_u64("SWEEPER_PERIOD_SECS", 5 * 60)),
            wait_estimate_per_intent: Duration::from_secs(env_u64(
                "WAIT_ESTIMATE_PER_INTENT_SECS",
                30,
            )),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_on_missing_or_malformed() {
        assert_eq!(env_u64("TICKETQUEUE_TEST_DOES_NOT_EXIST", 42), 42);
    }
}
