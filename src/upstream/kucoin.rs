/// KuCoin REST endpoints: kLines backfill and the bullet-token handshake
/// that precedes opening a WebSocket connection.
///
/// Restated from the original's `kucoin.RestClient`/`kucoin.Klines`: a
/// bounded retry loop around a single HTTP call, one second between
/// attempts, with a 429 response treated as "try again, don't cache
/// anything from this attempt" rather than an error to propagate.
use crate::error::ProxyError;
use crate::model::{Candle, Timeframe};
use crate::rate_limiter::TokenBucketLimiter;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_REST_BASE: &str = "https://openapi-v2.kucoin.com";

#[derive(Debug, Deserialize)]
struct KLinesWire {
    code: String,
    data: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BulletWireEnvelope {
    code: String,
    data: BulletWireData,
}

#[derive(Debug, Deserialize)]
struct BulletWireData {
    token: String,
    #[serde(rename = "instanceServers")]
    instance_servers: Vec<BulletWireServer>,
}

#[derive(Debug, Deserialize)]
struct BulletWireServer {
    endpoint: String,
    #[serde(rename = "pingInterval")]
    ping_interval_ms: u64,
    #[serde(rename = "pingTimeout")]
    ping_timeout_ms: u64,
}

/// A usable WS connection endpoint plus the token to append to it and
/// the heartbeat cadence the server asked for.
#[derive(Debug, Clone)]
pub struct BulletToken {
    pub token: String,
    pub endpoint: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

/// A completed kLines request: the upstream HTTP status and raw response
/// body (for the handler to forward verbatim), plus whatever candles
/// could be parsed out of it for the store — empty if the status wasn't
/// success or the body didn't parse, neither of which is fatal here.
#[derive(Debug)]
pub struct KlinesFetch {
    pub status: u16,
    pub raw: Vec<u8>,
    pub candles: Vec<Candle>,
}

/// Fetches `[start_at, end_at]` kLines for `symbol`/`timeframe`. Retries
/// up to `max_retries` times on a network-level failure or a 429
/// response; any other status is returned as-is without retrying, so the
/// caller can forward it verbatim (spec §4.7 scenario E: a 429 that
/// survives every retry still reaches the client as a 429, not a
/// synthesized 200). `Err` is reserved for the case where no HTTP
/// response was ever obtained, even after exhausting retries.
pub async fn fetch_klines(
    client: &reqwest::Client,
    limiter: &TokenBucketLimiter,
    base_url: &str,
    symbol: &str,
    timeframe: Timeframe,
    start_at: i64,
    end_at: i64,
    max_retries: u32,
) -> Result<KlinesFetch, ProxyError> {
    let url = format!("{base_url}/api/v1/market/candles");
    let mut last_err: Option<ProxyError> = None;

    for attempt in 0..=max_retries {
        limiter.take().await;

        let response = client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("type", timeframe.as_str()),
                ("startAt", &start_at.to_string()),
                ("endAt", &end_at.to_string()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                last_err = Some(ProxyError::UpstreamTransient(e.into()));
                sleep_before_retry(attempt, max_retries).await;
                continue;
            }
        };

        let status = response.status();
        if status.as_u16() == 429 && attempt < max_retries {
            warn!(symbol, timeframe = timeframe.as_str(), attempt, "kucoin rate-limited the backfill request, retrying");
            sleep_before_retry(attempt, max_retries).await;
            continue;
        }

        let raw = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                last_err = Some(ProxyError::UpstreamTransient(e.into()));
                sleep_before_retry(attempt, max_retries).await;
                continue;
            }
        };

        let candles = if status.is_success() {
            parse_klines_body(&raw, symbol, timeframe.as_str())
        } else {
            Vec::new()
        };

        return Ok(KlinesFetch {
            status: status.as_u16(),
            raw: raw.to_vec(),
            candles,
        });
    }

    Err(last_err.unwrap_or(ProxyError::UpstreamTransient(anyhow::anyhow!("exhausted retries"))))
}

/// Best-effort parse of a successful kLines body into candles. Parse
/// failures and a non-"200000" envelope code are logged and yield no
/// candles rather than an error — the raw body is still forwarded to the
/// client by the caller regardless of whether it could be parsed here.
fn parse_klines_body(raw: &[u8], symbol: &str, timeframe: &str) -> Vec<Candle> {
    let wire: KLinesWire = match serde_json::from_slice(raw) {
        Ok(w) => w,
        Err(e) => {
            warn!(symbol, timeframe, error = %e, "kucoin kLines body did not parse, forwarding raw bytes without caching");
            return Vec::new();
        }
    };
    if wire.code != "200000" {
        warn!(symbol, timeframe, code = %wire.code, "kucoin kLines envelope reported an error code");
        return Vec::new();
    }
    wire.data.iter().filter_map(|row| Candle::from_upstream_row(row)).collect()
}

async fn sleep_before_retry(attempt: u32, max_retries: u32) {
    if attempt < max_retries {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Fetches a fresh public bullet token, the credential required to open
/// a KuCoin market-data WebSocket connection.
pub async fn fetch_bullet_token(client: &reqwest::Client, base_url: &str) -> Result<BulletToken, ProxyError> {
    let url = format!("{base_url}/api/v1/bullet-public");
    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamTransient(e.into()))?;

    if !response.status().is_success() {
        return Err(ProxyError::UpstreamTransient(anyhow::anyhow!(
            "bullet-public returned status {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await.map_err(|e| ProxyError::UpstreamTransient(e.into()))?;
    let envelope: BulletWireEnvelope =
        serde_json::from_slice(&bytes).map_err(ProxyError::UpstreamMalformed)?;

    if envelope.code != "200000" {
        return Err(ProxyError::UpstreamTransient(anyhow::anyhow!(
            "bullet-public returned error code {}",
            envelope.code
        )));
    }

    let server = envelope
        .data
        .instance_servers
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::UpstreamTransient(anyhow::anyhow!("bullet-public returned no instance servers")))?;

    Ok(BulletToken {
        token: envelope.data.token,
        endpoint: server.endpoint,
        ping_interval: Duration::from_millis(server.ping_interval_ms),
        ping_timeout: Duration::from_millis(server.ping_timeout_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klines_wire_parses_a_representative_payload() {
        let raw = r#"{"code":"200000","data":[["1000","1.0","1.1","0.9","1.05","10","10.5"]]}"#;
        let wire: KLinesWire = serde_json::from_str(raw).unwrap();
        assert_eq!(wire.code, "200000");
        let candle = Candle::from_upstream_row(&wire.data[0]).unwrap();
        assert_eq!(candle.ts, 1000);
    }

    #[test]
    fn bullet_wire_parses_the_instance_server_list() {
        let raw = r#"{
            "code":"200000",
            "data":{
                "token":"abc123",
                "instanceServers":[{
                    "endpoint":"wss://ws-api.kucoin.com/endpoint",
                    "pingInterval":18000,
                    "pingTimeout":10000
                }]
            }
        }"#;
        let envelope: BulletWireEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.token, "abc123");
        assert_eq!(envelope.data.instance_servers[0].ping_interval_ms, 18000);
    }
}
