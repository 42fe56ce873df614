/// Caching reverse proxy for KuCoin's public REST API: a candle/kLine
/// cache kept fresh by REST backfill and a live WebSocket stream, with a
/// short-TTL transparent pass-through for everything else.
pub mod config;
pub mod error;
pub mod handlers;
pub mod log_throttle;
pub mod model;
pub mod rate_limiter;
pub mod server;
pub mod store;
pub mod stream;
pub mod ttl_cache;
pub mod upstream;
