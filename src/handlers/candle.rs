/// `GET /kucoin/api/v1/market/candles` — the cached candle endpoint.
///
/// Restated from the original's `candleHandler`: serve straight from the
/// store when it already has full coverage of the requested range. On a
/// miss, backfill the exact requested range from KuCoin REST, merge the
/// parsed candles into the store for next time, and forward the
/// upstream status code and raw body verbatim — a 429 reaches the client
/// as a 429, and a genuine first-touch miss returns the very bytes
/// upstream sent, not a resynthesized response. A live-window request
/// (one whose `endAt` reaches into "now") also arranges, fire-and-forget,
/// for the stream subscriber to keep that bucket fresh — but only once
/// the backfill that served this request actually succeeded.
use crate::handlers::AppState;
use crate::model::{bucket_key, KLinesResponse, Timeframe};
use crate::upstream::kucoin::fetch_klines;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct CandleQuery {
    pub symbol: String,
    #[serde(rename = "type")]
    pub timeframe: String,
    #[serde(rename = "startAt")]
    pub start_at: i64,
    #[serde(rename = "endAt")]
    pub end_at: i64,
}

pub async fn get_candles(state: web::Data<AppState>, query: web::Query<CandleQuery>) -> HttpResponse {
    let Some(timeframe) = Timeframe::parse(&query.timeframe) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "code": "400100",
            "msg": format!("unsupported candle type '{}'", query.timeframe),
        }));
    };

    if query.start_at > query.end_at {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "code": "400100",
            "msg": "startAt must not be after endAt",
        }));
    }

    let key = bucket_key(&query.symbol, timeframe);
    let period = timeframe.period_secs();
    let live_window = query.end_at > now_secs() - period;

    if has_full_coverage(&state, &key, query.start_at, query.end_at, period) {
        if live_window {
            state.stream.subscribe_klines(&query.symbol, timeframe).await;
        }
        let candles = state.candle_store.get(&key, query.start_at, query.end_at);
        return HttpResponse::Ok().json(KLinesResponse::from_candles(&candles));
    }

    match fetch_klines(
        &state.http,
        &state.rest_limiter,
        &state.rest_base,
        &query.symbol,
        timeframe,
        query.start_at,
        query.end_at,
        state.backfill_max_retries,
    )
    .await
    {
        Ok(fetch) if fetch.status == 200 => {
            if !fetch.candles.is_empty() {
                state.candle_store.store(&key, period, &fetch.candles);
            }
            if live_window {
                state.stream.subscribe_klines(&query.symbol, timeframe).await;
            }
            forward_raw(200, fetch.raw)
        }
        Ok(fetch) => {
            warn!(symbol = %query.symbol, timeframe = %query.timeframe, status = fetch.status, "forwarding non-success upstream status to client");
            forward_raw(fetch.status, fetch.raw)
        }
        Err(e) => {
            warn!(symbol = %query.symbol, timeframe = %query.timeframe, error = %e, "backfill request failed outright");
            HttpResponse::BadGateway().json(serde_json::json!({
                "code": "502000",
                "msg": "upstream request failed",
            }))
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn forward_raw(status: u16, raw: Vec<u8>) -> HttpResponse {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    HttpResponse::build(code).content_type("application/json").body(raw)
}

/// True if the store already holds a candle for every period-aligned
/// slot in `[from, to]` — a contiguous count check rather than a
/// slot-by-slot scan, since the store itself guarantees no internal
/// gaps once painted candles have filled them in.
fn has_full_coverage(state: &AppState, key: &str, from: i64, to: i64, period_secs: i64) -> bool {
    if period_secs <= 0 {
        return false;
    }
    let expected = (to - from) / period_secs + 1;
    let got = state.candle_store.get(key, from, to);
    got.len() as i64 >= expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_query_deserializes_kucoin_style_params() {
        let raw = r#"{"symbol":"BTC-USDT","type":"1min","startAt":1000,"endAt":2000}"#;
        let query: CandleQuery = serde_json::from_str(raw).unwrap();
        assert_eq!(query.timeframe, "1min");
        assert_eq!(query.start_at, 1000);
    }
}
