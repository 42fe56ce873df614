/// Everything that talks to kucoin.com over HTTP: kLines backfill and the
/// WS bullet-token handshake used to open a stream connection, per spec
/// §4.5 and §4.6.
pub mod kucoin;

use crate::error::ProxyError;
use std::time::Duration;

/// Builds the single `reqwest::Client` shared by every upstream call,
/// pooling connections the same way the teacher's retriever reused one
/// `binance::api::Binance` client rather than building one per request.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client, ProxyError> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProxyError::ConfigInvalid(format!("failed to build HTTP client: {e}")))
}
