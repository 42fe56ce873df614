/// In-memory candle cache: one `CandleBucket` per (symbol, timeframe),
/// fed concurrently by REST backfill and the WebSocket stream and read
/// by the candle handler.
///
/// Restated from the original `Store`. The original's `Store.Store`
/// releases the bucket-map lock before the selected bucket is guaranteed
/// published, which lets two concurrent callers for the same new key
/// each construct a bucket and race on which one the map ends up
/// holding (spec §9, resolved). Here `get_or_create` holds the map lock
/// for the full check-and-insert via `HashMap::entry`, so only one
/// bucket is ever created per key and every caller observes the same
/// `Arc`.
pub mod bucket;

use crate::log_throttle::LogThrottle;
use crate::model::Candle;
use bucket::CandleBucket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub struct CandleStore {
    buckets: Mutex<HashMap<String, Arc<Mutex<CandleBucket>>>>,
    cache_size: usize,
    gap_fill_log: LogThrottle,
}

impl CandleStore {
    pub fn new(cache_size: usize) -> CandleStore {
        CandleStore {
            buckets: Mutex::new(HashMap::new()),
            cache_size,
            gap_fill_log: LogThrottle::default(),
        }
    }

    fn get_or_create(&self, key: &str) -> Arc<Mutex<CandleBucket>> {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CandleBucket::new())))
            .clone()
    }

    /// Merges `candles` (any order, any overlap with existing data) into
    /// the bucket for `key`, gap-filling missing intervals with painted
    /// candles and trimming the bucket back to `cache_size` once done.
    /// Invalid input (empty batch) is a no-op, not an error — callers
    /// (REST backfill, the stream) are expected to skip empty upstream
    /// responses themselves, but the store does not trust them to.
    pub fn store(&self, key: &str, period_secs: i64, candles: &[Candle]) {
        if candles.is_empty() {
            return;
        }
        let bucket = self.get_or_create(key);
        let mut guard = bucket.lock().unwrap();
        let mut sorted: Vec<Candle> = candles.to_vec();
        sorted.sort_by_key(|c| c.ts);
        for candle in sorted {
            Self::merge_one(&mut guard, key, period_secs, candle, &self.gap_fill_log);
        }
        while guard.size() > self.cache_size {
            guard.remove(guard.size() - 1);
        }
    }

    fn merge_one(
        guard: &mut CandleBucket,
        key: &str,
        period_secs: i64,
        candle: Candle,
        gap_fill_log: &LogThrottle,
    ) {
        let Some(head) = guard.head().copied() else {
            guard.append(candle);
            return;
        };

        if candle.ts == head.ts {
            guard.set(0, candle);
            return;
        }

        if candle.ts > head.ts {
            Self::paint_gap(guard, key, period_secs, head, candle.ts, gap_fill_log, true);
            guard.prepend(candle);
            return;
        }

        // candle.ts < head.ts: belongs somewhere toward the tail (REST
        // backfill walking backwards through history).
        let tail_index = guard.size() - 1;
        let tail = *guard.tail().expect("bucket non-empty, head existed above");
        if candle.ts == tail.ts {
            guard.set(tail_index, candle);
        } else if candle.ts < tail.ts {
            Self::paint_gap(guard, key, period_secs, tail, candle.ts, gap_fill_log, false);
            guard.append(candle);
        } else {
            // Falls strictly between head and tail but matches neither:
            // an out-of-order point for data already covered. Dropped
            // rather than attempting an O(n) positional insert mid-deque.
            if gap_fill_log.should_emit(key) {
                warn!(key, ts = candle.ts, "dropping out-of-order candle update");
            }
        }
    }

    /// Fills zero-volume painted candles between `edge` (the current
    /// head or tail) and `target_ts` (exclusive on both ends), at
    /// `period_secs` spacing. `toward_head` selects whether painted
    /// candles are prepended (growing toward newer time) or appended
    /// (growing toward older time).
    fn paint_gap(
        guard: &mut CandleBucket,
        key: &str,
        period_secs: i64,
        edge: Candle,
        target_ts: i64,
        gap_fill_log: &LogThrottle,
        toward_head: bool,
    ) {
        if period_secs <= 0 {
            return;
        }
        let mut painted = 0u32;
        if toward_head {
            let mut ts = edge.ts + period_secs;
            while ts < target_ts {
                guard.prepend(Candle::painted(&edge, ts));
                ts += period_secs;
                painted += 1;
            }
        } else {
            let mut ts = edge.ts - period_secs;
            while ts > target_ts {
                guard.append(Candle::painted(&edge, ts));
                ts -= period_secs;
                painted += 1;
            }
        }
        if painted > 0 && gap_fill_log.should_emit(key) {
            warn!(key, count = painted, "painted candles to fill cache gap");
        }
    }

    /// Returns the cached candles for `key` whose timestamp falls in
    /// `[from, to]`, newest-first. Empty if the key has never been
    /// stored or no candle satisfies `to`.
    pub fn get(&self, key: &str, from: i64, to: i64) -> Vec<Candle> {
        let buckets = self.buckets.lock().unwrap();
        let Some(bucket) = buckets.get(key) else {
            return Vec::new();
        };
        let bucket = bucket.clone();
        drop(buckets);
        bucket.lock().unwrap().select_ts_range(from, to)
    }

    pub fn len(&self, key: &str) -> usize {
        let buckets = self.buckets.lock().unwrap();
        match buckets.get(key) {
            Some(b) => b.clone().lock().unwrap().size(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn candle(ts: i64, close: i64) -> Candle {
        Candle {
            ts,
            open: Decimal::from(close),
            high: Decimal::from(close),
            low: Decimal::from(close),
            close: Decimal::from(close),
            volume: Decimal::ONE,
            amount: Decimal::ONE,
        }
    }

    #[test]
    fn store_then_get_round_trips_a_single_candle() {
        let store = CandleStore::new(500);
        store.store("BTC-USDT:1min", 60, &[candle(1000, 1)]);
        let got = store.get("BTC-USDT:1min", 0, 2000);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ts, 1000);
    }

    #[test]
    fn unknown_key_returns_empty_not_panic() {
        let store = CandleStore::new(500);
        assert!(store.get("nope", 0, 1000).is_empty());
    }

    #[test]
    fn gap_between_existing_head_and_a_newer_candle_is_painted() {
        let store = CandleStore::new(500);
        store.store("k", 60, &[candle(1000, 5)]);
        store.store("k", 60, &[candle(1180, 9)]);
        let all = store.get("k", 0, 2000);
        let tss: Vec<i64> = all.iter().map(|c| c.ts).collect();
        assert_eq!(tss, vec![1180, 1120, 1060, 1000]);
        // painted candles clone the prior close/high/low/open and zero volume
        let painted = all.iter().find(|c| c.ts == 1120).unwrap();
        assert_eq!(painted.volume, Decimal::ZERO);
        assert_eq!(painted.close, Decimal::from(5));
    }

    #[test]
    fn a_candle_matching_the_head_timestamp_replaces_it_in_place() {
        let store = CandleStore::new(500);
        store.store("k", 60, &[candle(1000, 5)]);
        store.store("k", 60, &[candle(1000, 42)]);
        let all = store.get("k", 0, 2000);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].close, Decimal::from(42));
    }

    #[test]
    fn bucket_is_trimmed_to_cache_size() {
        let store = CandleStore::new(3);
        store.store(
            "k",
            60,
            &[candle(1000, 1), candle(1060, 2), candle(1120, 3), candle(1180, 4)],
        );
        assert_eq!(store.len("k"), 3);
        let all = store.get("k", 0, 10_000);
        assert_eq!(all.iter().map(|c| c.ts).collect::<Vec<_>>(), vec![1180, 1120, 1060]);
    }

    #[test]
    fn backfill_appends_older_history_toward_the_tail() {
        let store = CandleStore::new(500);
        store.store("k", 60, &[candle(1120, 3)]);
        store.store("k", 60, &[candle(1000, 1)]);
        let all = store.get("k", 0, 10_000);
        assert_eq!(all.iter().map(|c| c.ts).collect::<Vec<_>>(), vec![1120, 1060, 1000]);
    }
}
