//! Retry pacing for transient provider failures.
//!
//! Both external clients (the bot provider and the LLM endpoint) retry
//! 429s, 5xx responses, and connect timeouts on the same schedule: the
//! nominal step doubles per attempt up to a ceiling, and each delay
//! lands at a per-attempt point inside its step so parallel workers and
//! back-to-back meetings never retry in lockstep.

use std::time::Duration;

/// How a provider call is retried after transient failures.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    /// Step size before the first retry; doubles after each one.
    pub base: Duration,
    /// Upper bound on a single delay step.
    pub ceiling: Duration,
    /// Total attempts allowed, the first try included.
    pub budget: u32,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
            budget: 4,
        }
    }
}

/// Doubling past this point would overflow well before any sane ceiling
/// stops mattering.
const MAX_DOUBLINGS: u32 = 16;

impl RetrySchedule {
    /// Delay to sleep after failed attempt number `attempt` (0-indexed).
    ///
    /// The delay falls in the upper half of the current step
    /// (`base * 2^attempt`, capped at `ceiling`): never so short that a
    /// provider sees an immediate hammer, never longer than the step.
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        let step = self
            .base
            .saturating_mul(1u32 << attempt.min(MAX_DOUBLINGS))
            .min(self.ceiling);
        step.mul_f64(0.5 + scatter(attempt) / 2.0)
    }

    /// True once `attempt + 1` tries have been spent.
    pub fn out_of_attempts(&self, attempt: u32) -> bool {
        attempt + 1 >= self.budget
    }
}

/// A delay inside `[min, max]`, varying with `seed`.
///
/// Paces the pause between bot-create attempts. The exact point in the
/// range only needs to keep repeated joins off a fixed cadence.
pub fn delay_within(min: Duration, max: Duration, seed: u32) -> Duration {
    if max <= min {
        return min;
    }
    min + (max - min).mul_f64(scatter(seed))
}

/// Deterministic point in [0, 1) derived from `seed`.
///
/// Retries need decorrelation, not randomness, so a small integer
/// scramble is enough and keeps replays reproducible.
fn scatter(seed: u32) -> f64 {
    let mut x = seed.wrapping_add(0x9e37_79b9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x21f0_aaad);
    x ^= x >> 15;
    f64::from(x) / (f64::from(u32::MAX) + 1.0)
}
