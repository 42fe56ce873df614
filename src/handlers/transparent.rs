/// Transparent pass-through for every KuCoin REST endpoint the candle
/// handler doesn't own (tickers, symbols, currencies, ...), fronted by a
/// short-TTL byte cache so bursts of identical requests don't each hit
/// upstream.
///
/// Restated from the original's `transparentHandler` + `store.TTLCache`.
use crate::handlers::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::warn;

pub async fn pass_through(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let cache_key = req.uri().to_string();

    if let Some(cached) = state.ttl_cache.get(&cache_key) {
        return HttpResponse::Ok()
            .content_type("application/json")
            .body(cached.raw().to_vec());
    }

    state.rest_limiter.take().await;

    let upstream_path = req.uri().path().trim_start_matches("/kucoin");
    let url = match req.uri().query() {
        Some(q) => format!("{}{}?{}", state.rest_base, upstream_path, q),
        None => format!("{}{}", state.rest_base, upstream_path),
    };

    let response = match state.http.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url, error = %e, "transparent pass-through request failed");
            return HttpResponse::BadGateway().json(serde_json::json!({
                "code": "502000",
                "msg": "upstream request failed",
            }));
        }
    };

    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!(url, error = %e, "failed to read upstream response body");
            return HttpResponse::BadGateway().json(serde_json::json!({
                "code": "502000",
                "msg": "upstream response unreadable",
            }));
        }
    };

    if status.is_success() {
        state.ttl_cache.store(&cache_key, bytes.to_vec());
    }

    let mut builder = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(status.as_u16()).unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY),
    );
    builder.content_type("application/json").body(bytes.to_vec())
}
