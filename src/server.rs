/// HTTP server wiring: routes under `/kucoin`, the candle cache taking
/// priority over the transparent pass-through catch-all.
///
/// Grounded on the teacher's own `actix-web` bring-up in `bin/web_server.rs`
/// (`HttpServer::new(...).bind(...).run()`), generalized to this proxy's
/// route table and without the teacher's `process::exit` after shutdown —
/// spec §9 resolves that main should simply return once the server
/// future completes, so supervisors see a clean exit status rather than
/// disambiguating an explicit code.
use crate::config::Config;
use crate::error::ProxyError;
use crate::handlers::{candle, transparent, AppState};
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: &Config, state: Arc<AppState>) -> Result<(), ProxyError> {
    let bind_addr = config.bind_addr.clone();
    let bind_port = config.bind_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(state.clone()))
            .route("/kucoin/api/v1/market/candles", web::get().to(candle::get_candles))
            .default_service(web::route().to(transparent::pass_through))
    })
    .bind((bind_addr.as_str(), bind_port))
    .map_err(|e| ProxyError::ConfigInvalid(format!("failed to bind {bind_addr}:{bind_port}: {e}")))?
    .shutdown_timeout(config.shutdown_grace().as_secs())
    .run();

    info!(bind_addr, bind_port, "kucoin candle proxy listening");
    server
        .await
        .map_err(|e| ProxyError::UpstreamTransient(e.into()))
}
