use std::time::Duration;

/// Delay schedule for confirmation polling.
///
/// Attempt `n` (0-based) waits `min(initial * 2^n, max)` before querying.
/// Defaults give 500ms, 1s, 2s, 4s, 8s over five attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_millis(8_000),
            attempts: 5,
        }
    }
}

impl Backoff {
    pub fn from_millis(initial_ms: u64, max_ms: u64, attempts: u32) -> Self {
        Self {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms.max(initial_ms)),
            attempts,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Total sleep if every attempt is used.
    pub fn budget(&self) -> Duration {
        (0..self.attempts).map(|a| self.delay(a)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_half_a_second() {
        let b = Backoff::default();
        let ms: Vec<u128> = (0..b.attempts).map(|a| b.delay(a).as_millis()).collect();
        assert_eq!(ms, vec![500, 1000, 2000, 4000, 8000]);
        assert_eq!(b.budget(), Duration::from_millis(15_500));
    }

    #[test]
    fn delay_is_capped() {
        let b = Backoff::from_millis(500, 3_000, 8);
        assert_eq!(b.delay(3), Duration::from_millis(3_000));
        assert_eq!(b.delay(40), Duration::from_millis(3_000));
    }
}
