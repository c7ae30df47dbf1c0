//! Process-global sliding-window rate limiter.
//!
//! Enforces both requests-per-minute and estimated-tokens-per-minute
//! caps; every LLM caller acquires before sending so concurrent
//! extraction/aggregation workers cannot induce 429 storms.

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

struct Window {
    started: Instant,
    requests: u32,
    tokens: u64,
}

/// Sliding-window RPM/TPM limiter.
///
/// `acquire` blocks (asynchronously) until both caps have headroom within
/// the current 60-second window; the window resets on the wall-clock
/// boundary.
pub struct RateLimiter {
    limits: Option<(u32, u32)>,
    window: Mutex<Window>,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateLimiter {
    pub fn new(rpm_limit: u32, tpm_limit: u32) -> Self {
        Self {
            limits: Some((rpm_limit, tpm_limit)),
            window: Mutex::new(Window {
                started: Instant::now(),
                requests: 0,
                tokens: 0,
            }),
        }
    }

    /// A limiter that never blocks, for tests.
    pub fn unlimited() -> Self {
        Self {
            limits: None,
            window: Mutex::new(Window {
                started: Instant::now(),
                requests: 0,
                tokens: 0,
            }),
        }
    }

    /// Block until the request fits in the current window, then account
    /// for it.
    pub async fn acquire(&self, est_tokens: u32) {
        let Some((rpm, tpm)) = self.limits else {
            return;
        };

        loop {
            let wait = {
                let mut window = self.window.lock();
                let now = Instant::now();
                if now.duration_since(window.started) >= WINDOW {
                    window.started = now;
                    window.requests = 0;
                    window.tokens = 0;
                }

                let next_requests = window.requests + 1;
                let next_tokens = window.tokens + u64::from(est_tokens);
                if next_requests <= rpm && next_tokens <= u64::from(tpm) {
                    window.requests = next_requests;
                    window.tokens = next_tokens;
                    return;
                }

                WINDOW.saturating_sub(now.duration_since(window.started))
            };

            // Re-check at most every 2 s so a freed-up window is noticed
            // promptly even when the estimate was pessimistic.
            tokio::time::sleep(wait.min(Duration::from_secs(2)).max(Duration::from_millis(250)))
                .await;
        }
    }
}

/// Rough heuristic: 1 token ~= 4 chars. Good enough for throttling.
pub fn estimate_tokens(chars: usize) -> u32 {
    ((chars as u32) / 4).max(1)
}
