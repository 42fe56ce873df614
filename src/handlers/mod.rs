/// HTTP handlers mounted under the `/kucoin` prefix (spec §4.7, §4.8):
/// the candle-cache endpoint and the transparent pass-through for
/// everything else.
pub mod candle;
pub mod transparent;

use crate::rate_limiter::TokenBucketLimiter;
use crate::store::CandleStore;
use crate::stream::StreamSubscriber;
use crate::ttl_cache::TtlCache;
use std::sync::Arc;

/// Shared state injected into every handler via `actix_web::web::Data`.
pub struct AppState {
    pub http: reqwest::Client,
    pub rest_base: String,
    pub rest_limiter: Arc<TokenBucketLimiter>,
    pub candle_store: Arc<CandleStore>,
    pub ttl_cache: Arc<TtlCache>,
    pub stream: Arc<StreamSubscriber>,
    pub backfill_max_retries: u32,
}
