//! `FrameSource` adapter over the exchange's combined-stream WebSocket.
//!
//! Reconnect policy, ping/pong keepalive, and stale-connection detection
//! are carried over from the book-ticker feed this repository started
//! from; what's new is that a reconnect yields `Frame::StreamReset` so the
//! BookEngine knows to resynchronize.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use liquidity_engine::error::Result;
use liquidity_engine::ports::{Frame, FrameSource};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const STALE_THRESHOLD: Duration = Duration::from_secs(60);
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn build_url(base_url: &str, symbols: &[String]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@depth", s.to_lowercase()))
        .collect();
    format!("{base_url}?streams={}", streams.join("/"))
}

pub struct BinanceWsSource {
    url: String,
    stream: Option<WsStream>,
    backoff: Duration,
    last_message_at: Instant,
    pong_deadline: Option<Instant>,
    pending_reset: bool,
}

impl BinanceWsSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: base_url.to_string(),
            stream: None,
            backoff: INITIAL_BACKOFF,
            last_message_at: Instant::now(),
            pong_deadline: None,
            pending_reset: false,
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        loop {
            info!(url = %self.url, "connecting to exchange stream");
            match tokio_tungstenite::connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    info!("connected");
                    self.stream = Some(stream);
                    self.backoff = INITIAL_BACKOFF;
                    self.last_message_at = Instant::now();
                    self.pong_deadline = None;
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, delay = ?self.backoff, "connect failed, backing off");
                    tokio::time::sleep(self.backoff).await;
                    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

#[async_trait]
impl FrameSource for BinanceWsSource {
    async fn connect(&mut self, symbols: &[String]) -> Result<()> {
        self.url = build_url(&self.url, symbols);
        self.reconnect().await
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.pending_reset {
            self.pending_reset = false;
            return Ok(Some(Frame::StreamReset));
        }

        loop {
            let Some(stream) = self.stream.as_mut() else {
                self.reconnect().await?;
                self.pending_reset = false;
                return Ok(Some(Frame::StreamReset));
            };

            let pong_timeout_fut = match self.pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(Duration::from_secs(86_400)),
            };
            let pong_active = self.pong_deadline.is_some();

            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.last_message_at = Instant::now();
                            match serde_json::from_str::<serde_json::Value>(&text) {
                                Ok(value) => return Ok(Some(Frame::Depth(value))),
                                Err(e) => {
                                    debug!(error = %e, "non-JSON frame");
                                    continue;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.last_message_at = Instant::now();
                            let _ = stream.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.last_message_at = Instant::now();
                            self.pong_deadline = None;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("connection closed, will reconnect");
                            self.stream = None;
                        }
                        Some(Ok(_)) => {
                            self.last_message_at = Instant::now();
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read error, will reconnect");
                            self.stream = None;
                        }
                    }
                }
                _ = tokio::time::sleep(PING_INTERVAL) => {
                    let _ = stream.send(Message::Ping(vec![].into())).await;
                    self.pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
                }
                _ = tokio::time::sleep(STALE_CHECK_INTERVAL) => {
                    if self.last_message_at.elapsed() > STALE_THRESHOLD {
                        warn!("connection stale, will reconnect");
                        self.stream = None;
                    }
                }
                _ = pong_timeout_fut, if pong_active => {
                    warn!("pong timeout, will reconnect");
                    self.stream = None;
                }
            }

            if self.stream.is_none() {
                self.reconnect().await?;
                return Ok(Some(Frame::StreamReset));
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.send(Message::Close(None)).await;
        }
    }
}
