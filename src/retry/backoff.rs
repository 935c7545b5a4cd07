//! Backoff delay computation.

use rand::Rng;

/// `base * attempt`, capped.
pub fn linear_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    base_ms.saturating_mul(attempt as u64).min(max_ms)
}

/// `base * 2^(attempt-1)`, capped.
pub fn exponential_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let exponential_base = 2u64.saturating_pow(attempt - 1);
    base_ms.saturating_mul(exponential_base).min(max_ms)
}

/// Exponential delay randomized within [0.5x, 1.0x].
pub fn jittered_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let delay = exponential_delay(attempt, base_ms, max_ms);
    if delay == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(delay / 2..=delay)
}
