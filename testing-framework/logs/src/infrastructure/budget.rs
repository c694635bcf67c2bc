use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::{Instant, sleep};

/// Token bucket shared by every request sent to one cluster. `acquire` waits
/// until a token is available instead of rejecting the request.
#[derive(Debug)]
pub struct RequestBudget {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RequestBudget {
    /// `rate` tokens per second, holding at most `burst` tokens. The bucket
    /// starts full.
    #[must_use]
    pub fn new(rate: u32, burst: u32) -> Self {
        let rate = f64::from(rate.max(1));
        let capacity = f64::from(burst.max(1));
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait) => sleep(wait).await,
            }
        }
    }

    /// Takes a token, or returns how long until one is available.
    fn try_acquire(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_free_then_rate_applies() {
        let budget = RequestBudget::new(10, 2);
        let start = Instant::now();

        budget.acquire().await;
        budget.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        budget.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(99), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(110), "elapsed {elapsed:?}");
    }
}
