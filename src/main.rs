/// Entry point: parse configuration, wire up the candle store, upstream
/// client, rate limiters and stream subscriber, then run the HTTP
/// server until a shutdown signal arrives.
///
/// Per spec §9 (resolved): no `process::exit` after shutdown. `main`
/// just awaits `server::run` and returns its `Result` — a clean process
/// exit status is enough for a supervisor to see the shutdown as
/// graceful, and an explicit exit code would only recreate the race the
/// original's `os.Exit(0)` papered over (in-flight log lines losing the
/// race against process teardown).
use anyhow::Result;
use clap::Parser;
use kucoin_candle_proxy::config::Config;
use kucoin_candle_proxy::handlers::AppState;
use kucoin_candle_proxy::rate_limiter::TokenBucketLimiter;
use kucoin_candle_proxy::store::CandleStore;
use kucoin_candle_proxy::stream::StreamSubscriber;
use kucoin_candle_proxy::ttl_cache::TtlCache;
use kucoin_candle_proxy::server;
use kucoin_candle_proxy::upstream::build_http_client;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config.validate()?;

    let http = build_http_client(config.upstream_timeout())?;
    let rest_limiter = Arc::new(TokenBucketLimiter::new(config.rest_rate_limit));
    let subscribe_limiter = Arc::new(TokenBucketLimiter::new(config.ws_rate_limit));
    let candle_store = Arc::new(CandleStore::new(config.cache_size));
    let ttl_cache = Arc::new(TtlCache::new(config.ttl_cache_timeout()));
    let stream = Arc::new(StreamSubscriber::new(
        http.clone(),
        config.kucoin_rest_base.clone(),
        candle_store.clone(),
        subscribe_limiter,
    ));

    let state = Arc::new(AppState {
        http,
        rest_base: config.kucoin_rest_base.clone(),
        rest_limiter,
        candle_store,
        ttl_cache,
        stream,
        backfill_max_retries: config.backfill_max_retries,
    });

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        cache_size = config.cache_size,
        "starting kucoin candle proxy"
    );

    server::run(&config, state).await?;

    info!("shutdown complete");
    Ok(())
}
