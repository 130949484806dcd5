use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// A token-bucket rate limiter gating `Sink::export` calls. Disabled
/// (`enabled=false` or a zero rate) is represented as `None` so the common
/// case costs one branch, not a lock.
pub struct Throttle(Option<Mutex<State>>);

struct State {
    rate_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Throttle {
    pub fn new(enabled: bool, requests_per_sec: u32) -> Self {
        if !enabled || requests_per_sec == 0 {
            return Self(None);
        }
        Self(Some(Mutex::new(State {
            rate_per_sec: requests_per_sec as f64,
            tokens: requests_per_sec as f64,
            last_refill: Instant::now(),
        })))
    }

    /// Waits, if necessary, until a token is available and consumes it.
    pub async fn acquire(&self) {
        let Some(state) = &self.0 else {
            return;
        };
        loop {
            let wait = {
                let mut s = state.lock().await;
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(s.last_refill).as_secs_f64();
                s.tokens = (s.tokens + elapsed * s.rate_per_sec).min(s.rate_per_sec);
                s.last_refill = now;
                if s.tokens >= 1.0 {
                    s.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - s.tokens;
                    Some(Duration::from_secs_f64(deficit / s.rate_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_throttle_never_waits() {
        let throttle = Throttle::new(false, 0);
        let start = Instant::now();
        for _ in 0..1000 {
            throttle.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_throttle_spaces_out_requests_beyond_the_initial_burst() {
        let throttle = Throttle::new(true, 10);
        for _ in 0..10 {
            throttle.acquire().await;
        }
        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
