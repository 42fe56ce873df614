/// Core data types shared across the store, the upstream client and the
/// HTTP handlers: candles, timeframes and their wire representation.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One OHLCV record for a single trading interval.
///
/// Equality for store purposes is by `ts` only (see `CandleBucket`);
/// `PartialEq`/`Eq` here are field-wise and only used by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub amount: Decimal,
}

impl Candle {
    /// Builds a painted (gap-fill) candle: OHLC cloned from `prev`, volume
    /// and amount zeroed, timestamp advanced by one period.
    pub fn painted(prev: &Candle, ts: i64) -> Candle {
        Candle {
            ts,
            open: prev.open,
            high: prev.high,
            low: prev.low,
            close: prev.close,
            volume: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }

    /// Serializes to the upstream array shape: `[ts_s, open, high, low,
    /// close, volume, amount]`, all fields as strings, matching the
    /// KuCoin kLines response format.
    pub fn to_upstream_array(self) -> [String; 7] {
        [
            self.ts.to_string(),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.volume.to_string(),
            self.amount.to_string(),
        ]
    }

    /// Parses one upstream kLines row: `[ts_s, open, high, low, close,
    /// volume, amount]`, all strings. Returns `None` on a malformed row
    /// rather than erroring, since a single bad row should not abort an
    /// otherwise-usable batch (caller skips it with a warning).
    pub fn from_upstream_row(row: &[String]) -> Option<Candle> {
        if row.len() < 7 {
            return None;
        }
        let ts: i64 = row[0].parse().ok()?;
        let open: Decimal = row[1].parse().ok()?;
        let high: Decimal = row[2].parse().ok()?;
        let low: Decimal = row[3].parse().ok()?;
        let close: Decimal = row[4].parse().ok()?;
        let volume: Decimal = row[5].parse().ok()?;
        let amount: Decimal = row[6].parse().ok()?;
        Some(Candle {
            ts,
            open,
            high,
            low,
            close,
            volume,
            amount,
        })
    }
}

/// The closed set of candle intervals the proxy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour8,
    Hour12,
    Day1,
    Week1,
}

impl Timeframe {
    /// Parses the KuCoin period string (e.g. `"1min"`, `"1hour"`, `"1week"`).
    pub fn parse(s: &str) -> Option<Timeframe> {
        use Timeframe::*;
        Some(match s {
            "1min" => Min1,
            "3min" => Min3,
            "5min" => Min5,
            "15min" => Min15,
            "30min" => Min30,
            "1hour" => Hour1,
            "2hour" => Hour2,
            "4hour" => Hour4,
            "6hour" => Hour6,
            "8hour" => Hour8,
            "12hour" => Hour12,
            "1day" => Day1,
            "1week" => Week1,
            _ => return None,
        })
    }

    /// Wire representation, the inverse of `parse`.
    pub fn as_str(self) -> &'static str {
        use Timeframe::*;
        match self {
            Min1 => "1min",
            Min3 => "3min",
            Min5 => "5min",
            Min15 => "15min",
            Min30 => "30min",
            Hour1 => "1hour",
            Hour2 => "2hour",
            Hour4 => "4hour",
            Hour6 => "6hour",
            Hour8 => "8hour",
            Hour12 => "12hour",
            Day1 => "1day",
            Week1 => "1week",
        }
    }

    /// The fixed interval duration this timeframe represents.
    pub fn duration(self) -> Duration {
        use Timeframe::*;
        let secs: u64 = match self {
            Min1 => 60,
            Min3 => 180,
            Min5 => 300,
            Min15 => 900,
            Min30 => 1800,
            Hour1 => 3600,
            Hour2 => 7200,
            Hour4 => 14400,
            Hour6 => 21600,
            Hour8 => 28800,
            Hour12 => 43200,
            Day1 => 86400,
            Week1 => 604800,
        };
        Duration::from_secs(secs)
    }

    /// Same duration, in whole seconds — the unit candle timestamps use.
    pub fn period_secs(self) -> i64 {
        self.duration().as_secs() as i64
    }
}

/// Builds the store's bucket key for a (symbol, timeframe) pair:
/// `"<symbol>:<timeframe>"`.
pub fn bucket_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}:{}", symbol, timeframe.as_str())
}

/// Builds the streaming topic for a (symbol, timeframe) pair:
/// `"/market/candles:<symbol>_<timeframe>"`.
pub fn topic(symbol: &str, timeframe: Timeframe) -> String {
    format!("/market/candles:{}_{}", symbol, timeframe.as_str())
}

/// Envelope used for both the upstream response and the synthesized
/// cache-hit response: `{"code":"200000","data":[[...], ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KLinesResponse {
    pub code: String,
    pub data: Vec<[String; 7]>,
}

impl KLinesResponse {
    pub fn from_candles(candles: &[Candle]) -> KLinesResponse {
        KLinesResponse {
            code: "200000".to_string(),
            data: candles.iter().map(|c| c.to_upstream_array()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_roundtrips_through_its_wire_string() {
        for tf in [
            Timeframe::Min1,
            Timeframe::Min3,
            Timeframe::Hour1,
            Timeframe::Day1,
            Timeframe::Week1,
        ] {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
    }

    #[test]
    fn unknown_timeframe_string_is_rejected() {
        assert_eq!(Timeframe::parse("7min"), None);
    }

    #[test]
    fn painted_candle_zeroes_volume_and_amount_but_clones_ohlc() {
        let prev = Candle {
            ts: 1000,
            open: "1.0".parse().unwrap(),
            high: "2.0".parse().unwrap(),
            low: "0.5".parse().unwrap(),
            close: "1.5".parse().unwrap(),
            volume: "10".parse().unwrap(),
            amount: "15".parse().unwrap(),
        };
        let painted = Candle::painted(&prev, 1060);
        assert_eq!(painted.ts, 1060);
        assert_eq!(painted.open, prev.open);
        assert_eq!(painted.close, prev.close);
        assert_eq!(painted.volume, Decimal::ZERO);
        assert_eq!(painted.amount, Decimal::ZERO);
    }

    #[test]
    fn from_upstream_row_rejects_short_rows() {
        let row = vec!["1".to_string(), "2".to_string()];
        assert!(Candle::from_upstream_row(&row).is_none());
    }
}
