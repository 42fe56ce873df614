/// Error kinds named in spec §7. Nothing originating from the store or
/// the subscriber is ever surfaced to a client; handlers log these and
/// fall back to the best-effort behavior the call site documents.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("upstream request failed (transient): {0}")]
    UpstreamTransient(#[source] anyhow::Error),

    #[error("upstream returned an unparseable body: {0}")]
    UpstreamMalformed(#[source] serde_json::Error),

    #[error("invalid store input: {0}")]
    StoreInputInvalid(String),

    #[error("subscribe failed for topic '{topic}': {source}")]
    SubscribeFailed {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("graceful shutdown deadline exceeded")]
    ShutdownDeadlineExceeded,
}
