use chrono::Duration;

/// Delay before retry `n`: `interval * 2^n`, capped at `max`.
pub fn backoff(retry_count: u32, interval: Duration, max: Duration) -> Duration {
    let factor = 1i32.checked_shl(retry_count.min(30)).unwrap_or(i32::MAX);
    interval
        .checked_mul(factor)
        .map(|delay| delay.min(max))
        .unwrap_or(max)
}
