/// Process configuration, parsed from CLI flags with environment
/// variable fallbacks — the same `clap::Parser` derive style the
/// teacher uses for its own CLI, generalized to this proxy's surface
/// (spec §6).
use crate::error::ProxyError;
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "kucoin-candle-proxy", about = "Caching reverse proxy for KuCoin's public REST API")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "PROXY_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// Port the HTTP server binds to.
    #[arg(long, env = "PROXY_BIND_PORT", default_value_t = 8080)]
    pub bind_port: u16,

    /// Base URL of the upstream KuCoin REST API.
    #[arg(long, env = "KUCOIN_REST_BASE", default_value = "https://openapi-v2.kucoin.com")]
    pub kucoin_rest_base: String,

    /// Maximum candles retained per (symbol, timeframe) bucket.
    #[arg(long, env = "PROXY_CACHE_SIZE", default_value_t = 1500)]
    pub cache_size: usize,

    /// REST requests/sec allowed to upstream for backfill and pass-through.
    #[arg(long, env = "PROXY_REST_RATE_LIMIT", default_value_t = 15)]
    pub rest_rate_limit: u32,

    /// WS subscribe requests/sec allowed to upstream.
    #[arg(long, env = "PROXY_WS_RATE_LIMIT", default_value_t = 9)]
    pub ws_rate_limit: u32,

    /// TTL, in seconds, for the transparent pass-through byte cache.
    #[arg(long, env = "PROXY_TTL_CACHE_SECONDS", default_value_t = 600)]
    pub ttl_cache_seconds: u64,

    /// How many times a backfill REST call is retried before giving up.
    #[arg(long, env = "PROXY_BACKFILL_MAX_RETRIES", default_value_t = 3)]
    pub backfill_max_retries: u32,

    /// Per-request timeout for upstream HTTP calls, in seconds.
    #[arg(long, env = "PROXY_UPSTREAM_TIMEOUT_SECONDS", default_value_t = 10)]
    pub upstream_timeout_seconds: u64,

    /// Seconds to wait for in-flight requests to finish on shutdown.
    #[arg(long, env = "PROXY_SHUTDOWN_GRACE_SECONDS", default_value_t = 30)]
    pub shutdown_grace_seconds: u64,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or
    /// "kucoin_candle_proxy=debug,actix_web=info".
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.cache_size == 0 {
            return Err(ProxyError::ConfigInvalid("cache_size must be greater than zero".into()));
        }
        if self.rest_rate_limit == 0 {
            return Err(ProxyError::ConfigInvalid("rest_rate_limit must be greater than zero".into()));
        }
        if self.ws_rate_limit == 0 {
            return Err(ProxyError::ConfigInvalid("ws_rate_limit must be greater than zero".into()));
        }
        if self.ttl_cache_seconds == 0 {
            return Err(ProxyError::ConfigInvalid("ttl_cache_seconds must be greater than zero".into()));
        }
        if self.kucoin_rest_base.is_empty() {
            return Err(ProxyError::ConfigInvalid("kucoin_rest_base must not be empty".into()));
        }
        Ok(())
    }

    pub fn ttl_cache_timeout(&self) -> Duration {
        Duration::from_secs(self.ttl_cache_seconds)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn rejects_a_zero_cache_size() {
        let config = Config::parse_from(["kucoin-candle-proxy", "--cache-size", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_pass_validation() {
        let config = Config::parse_from(["kucoin-candle-proxy"]);
        assert!(config.validate().is_ok());
    }
}
