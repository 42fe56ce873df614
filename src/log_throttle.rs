/// Rate-limits a per-key log line to at most once per `window`.
///
/// Used by the candle store to avoid flooding logs with one warning per
/// painted candle — restated from the original's `Store.logCache
/// sync.Map` (a concurrent map from key to last-emit time).
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct LogThrottle {
    last_emit: Mutex<HashMap<String, Instant>>,
    window: Duration,
}

impl LogThrottle {
    pub fn new(window: Duration) -> LogThrottle {
        LogThrottle {
            last_emit: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Returns `true` the first time it's called for `key`, and again
    /// after `window` has elapsed since the last `true`; `false`
    /// otherwise. Exact timing is not required, only that the caller not
    /// flood its log on `false`.
    pub fn should_emit(&self, key: &str) -> bool {
        let mut guard = self.last_emit.lock().unwrap();
        let now = Instant::now();
        match guard.get(key) {
            Some(last) if now.duration_since(*last) <= self.window => false,
            _ => {
                guard.insert(key.to_string(), now);
                true
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> LogThrottle {
        LogThrottle::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_emits() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("BTC-USDT:1min"));
    }

    #[test]
    fn second_call_within_window_is_suppressed() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("k"));
        assert!(!throttle.should_emit("k"));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit("a"));
        assert!(throttle.should_emit("b"));
    }

    #[test]
    fn emits_again_after_the_window_elapses() {
        let throttle = LogThrottle::new(Duration::from_millis(10));
        assert!(throttle.should_emit("k"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(throttle.should_emit("k"));
    }
}
