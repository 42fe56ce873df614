/// Live candle updates over KuCoin's public WebSocket feed, grounded on
/// the original's `StreamManager`: a small pool of WS connections, each
/// capped at a maximum number of subscribed topics, with idempotent
/// subscribe, periodic ping/pong with a liveness timeout, and
/// resubscribe-on-reconnect.
use crate::model::{bucket_key, topic, Candle, Timeframe};
use crate::rate_limiter::TokenBucketLimiter;
use crate::store::CandleStore;
use crate::upstream::kucoin::{fetch_bullet_token, BulletToken};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

/// Maximum candle topics a single KuCoin WS connection will carry before
/// a new connection is opened for further subscriptions.
const MAX_TOPICS_PER_CONNECTION: usize = 100;

/// Bound on consecutive reconnect attempts' backoff before it plateaus.
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

pub fn reconnect_backoff(attempt: u32) -> Duration {
    let secs = 1u64.saturating_mul(1 << attempt.min(5));
    Duration::from_secs(secs).min(MAX_RECONNECT_BACKOFF)
}

struct Connection {
    id: u64,
    topics: HashSet<String>,
    outbox: mpsc::UnboundedSender<Message>,
}

pub struct StreamSubscriber {
    http: reqwest::Client,
    rest_base: String,
    store: Arc<CandleStore>,
    subscribe_limiter: Arc<TokenBucketLimiter>,
    connections: Mutex<Vec<Connection>>,
    next_req_id: AtomicU64,
    next_conn_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: Option<WsCandleData>,
}

#[derive(Debug, Deserialize)]
struct WsCandleData {
    symbol: String,
    candles: Vec<String>,
}

impl StreamSubscriber {
    pub fn new(
        http: reqwest::Client,
        rest_base: String,
        store: Arc<CandleStore>,
        subscribe_limiter: Arc<TokenBucketLimiter>,
    ) -> StreamSubscriber {
        StreamSubscriber {
            http,
            rest_base,
            store,
            subscribe_limiter,
            connections: Mutex::new(Vec::new()),
            next_req_id: AtomicU64::new(1),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Ensures `symbol`/`timeframe` is subscribed on some connection in
    /// the pool, opening a new connection if every existing one is at
    /// capacity. A no-op if already subscribed. Blocks on the WS-subscribe
    /// rate limiter (spec §4.4/§4.6: 9 permits/sec) before sending the
    /// subscribe frame.
    pub async fn subscribe_klines(self: &Arc<Self>, symbol: &str, timeframe: Timeframe) {
        let topic_name = topic(symbol, timeframe);

        {
            let conns = self.connections.lock().await;
            if conns.iter().any(|c| c.topics.contains(&topic_name)) {
                return;
            }
        }

        let slot = {
            let conns = self.connections.lock().await;
            conns.iter().position(|c| c.topics.len() < MAX_TOPICS_PER_CONNECTION)
        };

        let index = match slot {
            Some(i) => i,
            None => match self.open_connection().await {
                Ok(i) => i,
                Err(e) => {
                    error!(symbol, error = %e, "failed to open a websocket connection for subscription");
                    return;
                }
            },
        };

        self.subscribe_limiter.take().await;

        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::Text(
            json!({
                "id": req_id.to_string(),
                "type": "subscribe",
                "topic": topic_name,
                "privateChannel": false,
                "response": true,
            })
            .to_string()
            .into(),
        );

        let mut conns = self.connections.lock().await;
        if let Some(conn) = conns.get_mut(index) {
            if conn.outbox.send(message).is_ok() {
                conn.topics.insert(topic_name);
            }
        }
    }

    /// Opens a fresh KuCoin WS connection, spawns its read/write/heartbeat
    /// tasks, and returns the index it was pushed at in `connections`.
    async fn open_connection(self: &Arc<Self>) -> anyhow::Result<usize> {
        let bullet = fetch_bullet_token(&self.http, &self.rest_base).await?;
        let connect_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}?token={}&connectId={}", bullet.endpoint, bullet.token, connect_id);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let last_activity = Arc::new(std::sync::Mutex::new(Instant::now()));

        let subscriber = Arc::clone(self);
        let read_activity = Arc::clone(&last_activity);
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                *read_activity.lock().unwrap() = Instant::now();
                match frame {
                    Ok(Message::Text(text)) => subscriber.handle_text_message(&text),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        warn!(conn_id, "kucoin websocket connection closed");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(conn_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            let lost_topics = subscriber.remove_connection(conn_id).await;
            Arc::clone(&subscriber).reconnect_and_resubscribe(lost_topics).await;
        });

        self.spawn_heartbeat(conn_id, tx.clone(), bullet.ping_interval, bullet.ping_timeout, last_activity);

        let mut conns = self.connections.lock().await;
        conns.push(Connection {
            id: conn_id,
            topics: HashSet::new(),
            outbox: tx,
        });
        Ok(conns.len() - 1)
    }

    fn spawn_heartbeat(
        self: &Arc<Self>,
        conn_id: u64,
        outbox: mpsc::UnboundedSender<Message>,
        interval: Duration,
        ping_timeout: Duration,
        last_activity: Arc<std::sync::Mutex<Instant>>,
    ) {
        let interval = if interval.is_zero() { Duration::from_secs(18) } else { interval };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let idle_for = last_activity.lock().unwrap().elapsed();
                if idle_for > ping_timeout {
                    warn!(conn_id, idle_ms = idle_for.as_millis() as u64, "no server activity within ping_timeout, closing stale connection");
                    let _ = outbox.send(Message::Close(None));
                    break;
                }
                let ping = json!({"id": "ping", "type": "ping"}).to_string();
                if outbox.send(Message::Text(ping.into())).is_err() {
                    break;
                }
            }
        });
    }

    /// Removes the connection with `conn_id` from the pool and returns
    /// the set of topics it was carrying at the moment of removal, so the
    /// caller can resubscribe them on a replacement connection.
    async fn remove_connection(&self, conn_id: u64) -> Vec<String> {
        let mut conns = self.connections.lock().await;
        match conns.iter().position(|c| c.id == conn_id) {
            Some(pos) => conns.remove(pos).topics.into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Reopens a connection and resubscribes every topic the dead
    /// connection was carrying.
    async fn reconnect_and_resubscribe(self: Arc<Self>, lost_topics: Vec<String>) {
        let mut attempt = 0;
        loop {
            tokio::time::sleep(reconnect_backoff(attempt)).await;
            match self.open_connection().await {
                Ok(_) => break,
                Err(e) => {
                    attempt += 1;
                    error!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
        for t in lost_topics {
            if let Some((symbol, timeframe)) = parse_topic(&t) {
                self.subscribe_klines(&symbol, timeframe).await;
            }
        }
    }

    fn handle_text_message(&self, text: &str) {
        let envelope: WsEnvelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(_) => return,
        };
        if envelope.kind != "message" {
            return;
        }
        let Some(topic_name) = envelope.topic else { return };
        let Some(data) = envelope.data else { return };
        let Some((symbol, timeframe)) = parse_topic(&topic_name) else { return };
        if symbol != data.symbol {
            warn!(topic = %topic_name, payload_symbol = %data.symbol, "dropping candle push with a symbol that doesn't match its topic");
            return;
        }
        let Some(candle) = Candle::from_upstream_row(&data.candles) else {
            warn!(topic = %topic_name, "dropping malformed streamed candle");
            return;
        };
        self.store
            .store(&bucket_key(&symbol, timeframe), timeframe.period_secs(), std::slice::from_ref(&candle));
        info!(symbol = %symbol, timeframe = timeframe.as_str(), ts = candle.ts, "applied streamed candle");
    }
}

/// Parses `"/market/candles:<symbol>_<timeframe>"` back into its parts.
fn parse_topic(topic: &str) -> Option<(String, Timeframe)> {
    let rest = topic.strip_prefix("/market/candles:")?;
    let (symbol, tf) = rest.rsplit_once('_')?;
    let timeframe = Timeframe::parse(tf)?;
    Some((symbol.to_string(), timeframe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topic_recovers_symbol_and_timeframe() {
        let (symbol, tf) = parse_topic("/market/candles:BTC-USDT_1min").unwrap();
        assert_eq!(symbol, "BTC-USDT");
        assert_eq!(tf, Timeframe::Min1);
    }

    #[test]
    fn parse_topic_rejects_an_unrelated_string() {
        assert!(parse_topic("/market/ticker:BTC-USDT").is_none());
    }

    #[test]
    fn reconnect_backoff_doubles_then_plateaus() {
        assert_eq!(reconnect_backoff(0), Duration::from_secs(1));
        assert_eq!(reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(reconnect_backoff(2), Duration::from_secs(4));
        assert_eq!(reconnect_backoff(10), MAX_RECONNECT_BACKOFF);
    }

    #[test]
    fn ws_envelope_parses_a_representative_candle_push() {
        let raw = r#"{
            "type":"message",
            "topic":"/market/candles:BTC-USDT_1min",
            "subject":"trade.candles.update",
            "data":{
                "symbol":"BTC-USDT",
                "candles":["1000","1.0","1.1","0.9","1.05","10","10.5"],
                "time":1000000000
            }
        }"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "message");
        assert_eq!(envelope.data.unwrap().symbol, "BTC-USDT");
    }
}
