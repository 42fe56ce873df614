/// Generic short-TTL byte cache used by the transparent handler for
/// non-candle endpoints (tickers, currencies, symbols).
///
/// Restated from the original `store.TTLCache`: a single global timeout,
/// lazy eviction on read, no active eviction loop. Growth is bounded by
/// the working-set size of request URIs in practice, per spec §4.3.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct Container {
    raw: std::sync::Arc<[u8]>,
}

impl Container {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

struct Entry {
    raw: std::sync::Arc<[u8]>,
    expires_at: Instant,
}

pub struct TtlCache {
    kv: Mutex<HashMap<String, Entry>>,
    timeout: Duration,
}

impl TtlCache {
    pub fn new(timeout: Duration) -> TtlCache {
        TtlCache {
            kv: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Returns the cached bytes for `key` if present and not expired. An
    /// expired entry is deleted as a side effect of this call.
    pub fn get(&self, key: &str) -> Option<Container> {
        let mut guard = self.kv.lock().unwrap();
        let entry = guard.get(key)?;
        if Instant::now() >= entry.expires_at {
            guard.remove(key);
            return None;
        }
        Some(Container {
            raw: entry.raw.clone(),
        })
    }

    /// Stores `value` under `key`, expiring `timeout` from now.
    pub fn store(&self, key: &str, value: Vec<u8>) {
        let expires_at = Instant::now() + self.timeout;
        self.kv.lock().unwrap().insert(
            key.to_string(),
            Entry {
                raw: value.into(),
                expires_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_then_returns_bytes_before_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.store("x", vec![0xAB]);
        assert_eq!(cache.get("x").unwrap().raw(), &[0xAB]);
    }

    #[test]
    fn expires_after_timeout() {
        let cache = TtlCache::new(Duration::from_millis(50));
        cache.store("x", vec![0xAB]);
        assert!(cache.get("x").is_some());
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.get("x").is_none());
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn expired_entry_is_deleted_on_read_not_just_hidden() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.store("x", vec![1]);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("x").is_none());
        // storing a fresh value under the same key must not be blocked
        // by stale state left behind by the expired entry.
        cache.store("x", vec![2]);
        assert_eq!(cache.get("x").unwrap().raw(), &[2]);
    }
}
