//! Reference backend for plain HTTP/ICY radio streams.
//!
//! Keeps the stream connection open, splits inline ICY metadata out of the
//! byte stream (per the `icy-metaint` header) and emits the stream title as
//! [`PlayerEvent::MetadataChanged`]. Audio bytes go to an optional sink
//! channel; decoding is the embedder's concern.
//!
//! Transport failures are retried per [`RetryPolicy`]: the error counter
//! resets after every successful connect, and when the policy gives up the
//! backend emits a fatal [`PlayerEvent::Error`].

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::constants::{PLAYER_EVENT_CHANNEL_CAPACITY, USER_AGENT};
use crate::runtime::{TaskSpawner, TokioSpawner};

use super::{
    BackendPlayer, LoadErrorKind, PlayerBackendKind, PlayerError, PlayerEvent, PlayerItem,
    PlayerResult, RetryDecision, RetryPolicy,
};

use async_trait::async_trait;

#[derive(Default)]
struct IcyState {
    queue: Vec<PlayerItem>,
    current_index: Option<usize>,
    is_playing: bool,
    stream_cancel: Option<CancellationToken>,
}

/// [`BackendPlayer`] for direct HTTP/ICY streams.
pub struct IcyStreamBackend {
    client: reqwest::Client,
    state: Arc<Mutex<IcyState>>,
    events_tx: broadcast::Sender<PlayerEvent>,
    retry_policy: RetryPolicy,
    audio_sink: Option<mpsc::Sender<Bytes>>,
    spawner: TokioSpawner,
}

impl IcyStreamBackend {
    /// Creates a backend with the default retry policy and no audio sink.
    #[must_use]
    pub fn new(spawner: TokioSpawner) -> Self {
        let (events_tx, _) = broadcast::channel(PLAYER_EVENT_CHANNEL_CAPACITY);
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            state: Arc::new(Mutex::new(IcyState::default())),
            events_tx,
            retry_policy: RetryPolicy::default(),
            audio_sink: None,
            spawner,
        }
    }

    /// Overrides the transport retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Forwards decoded-out audio bytes to the given channel.
    #[must_use]
    pub fn with_audio_sink(mut self, sink: mpsc::Sender<Bytes>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events_tx.send(event);
    }

    fn set_playing(&self, is_playing: bool) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.is_playing != is_playing;
            state.is_playing = is_playing;
            changed
        };
        if changed {
            self.emit(PlayerEvent::IsPlayingChanged { is_playing });
        }
    }

    fn cancel_stream_task(&self) {
        if let Some(cancel) = self.state.lock().stream_cancel.take() {
            cancel.cancel();
        }
    }

    fn start_stream_task(&self, item: PlayerItem) {
        let cancel = CancellationToken::new();
        self.state.lock().stream_cancel = Some(cancel.clone());

        let client = self.client.clone();
        let events_tx = self.events_tx.clone();
        let state = Arc::clone(&self.state);
        let retry_policy = self.retry_policy;
        let audio_sink = self.audio_sink.clone();

        self.spawner.spawn(async move {
            let result = run_stream(
                &client,
                &item,
                retry_policy,
                audio_sink,
                &events_tx,
                &cancel,
            )
            .await;

            let was_playing = {
                let mut locked = state.lock();
                let was = locked.is_playing;
                locked.is_playing = false;
                was
            };
            if was_playing {
                let _ = events_tx.send(PlayerEvent::IsPlayingChanged { is_playing: false });
            }
            if let Err(error) = result {
                log::error!("[IcyBackend] Stream ended with error: {error}");
                let _ = events_tx.send(PlayerEvent::Error { error });
            }
        });
    }
}

#[async_trait]
impl BackendPlayer for IcyStreamBackend {
    fn kind(&self) -> PlayerBackendKind {
        PlayerBackendKind::Local
    }

    async fn play(&self) -> PlayerResult<()> {
        let item = {
            let state = self.state.lock();
            state
                .current_index
                .and_then(|i| state.queue.get(i).cloned())
        }
        .ok_or(PlayerError::NothingQueued)?;

        self.cancel_stream_task();
        log::info!("[IcyBackend] Playing {} ({})", item.title, item.stream_uri);
        self.set_playing(true);
        self.start_stream_task(item);
        Ok(())
    }

    async fn pause(&self) -> PlayerResult<()> {
        log::info!("[IcyBackend] Pausing");
        self.cancel_stream_task();
        self.set_playing(false);
        Ok(())
    }

    async fn stop(&self) -> PlayerResult<()> {
        log::info!("[IcyBackend] Stopping");
        self.cancel_stream_task();
        self.set_playing(false);
        Ok(())
    }

    async fn seek_to_live(&self) -> PlayerResult<()> {
        // A live HTTP stream has no seekable buffer; reconnecting is the
        // live edge. Only needed when a stream is actually open.
        if self.state.lock().is_playing {
            self.play().await?;
        }
        Ok(())
    }

    async fn set_items(&self, items: Vec<PlayerItem>, start_index: usize) -> PlayerResult<()> {
        let mut state = self.state.lock();
        state.current_index = if items.is_empty() {
            None
        } else {
            Some(start_index.min(items.len() - 1))
        };
        state.queue = items;
        Ok(())
    }

    fn current_item(&self) -> Option<PlayerItem> {
        let state = self.state.lock();
        state.current_index.and_then(|i| state.queue.get(i).cloned())
    }

    fn current_index(&self) -> Option<usize> {
        self.state.lock().current_index
    }

    fn is_playing(&self) -> bool {
        self.state.lock().is_playing
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events_tx.subscribe()
    }
}

/// Connect-read-reconnect loop for one stream URI.
async fn run_stream(
    client: &reqwest::Client,
    item: &PlayerItem,
    retry_policy: RetryPolicy,
    audio_sink: Option<mpsc::Sender<Bytes>>,
    events_tx: &broadcast::Sender<PlayerEvent>,
    cancel: &CancellationToken,
) -> PlayerResult<()> {
    let mut error_count: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        match open_stream(client, &item.stream_uri).await {
            Ok((response, metaint)) => {
                // Connection is up again; the reconnect budget starts over
                error_count = 0;
                match read_stream(response, metaint, audio_sink.as_ref(), events_tx, cancel)
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(error) => {
                        log::warn!("[IcyBackend] Stream read failed: {error}");
                    }
                }
            }
            Err((kind, error)) => {
                if kind == LoadErrorKind::Other {
                    return Err(error);
                }
                log::warn!("[IcyBackend] Connect failed: {error}");
            }
        }

        error_count += 1;
        match retry_policy.decide(error_count, LoadErrorKind::NetworkIo) {
            RetryDecision::RetryAfter(delay) => {
                log::info!(
                    "[IcyBackend] Reconnecting in {}ms (attempt {error_count})",
                    delay.as_millis()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::NoRetry => {
                return Err(PlayerError::Network(format!(
                    "gave up after {error_count} reconnect attempts"
                )));
            }
        }
    }
}

/// Opens the stream and returns the response plus the ICY metadata interval.
async fn open_stream(
    client: &reqwest::Client,
    uri: &str,
) -> Result<(reqwest::Response, Option<usize>), (LoadErrorKind, PlayerError)> {
    let response = client
        .get(uri)
        .header("Icy-MetaData", "1")
        .send()
        .await
        .map_err(|e| {
            (
                LoadErrorKind::NetworkIo,
                PlayerError::Network(e.to_string()),
            )
        })?;

    if !response.status().is_success() {
        return Err((
            LoadErrorKind::Other,
            PlayerError::UnsupportedStream(format!("HTTP {}", response.status())),
        ));
    }

    let metaint = response
        .headers()
        .get("icy-metaint")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0);

    Ok((response, metaint))
}

/// Reads the body until cancellation or a transport error.
async fn read_stream(
    response: reqwest::Response,
    metaint: Option<usize>,
    audio_sink: Option<&mpsc::Sender<Bytes>>,
    events_tx: &broadcast::Sender<PlayerEvent>,
    cancel: &CancellationToken,
) -> PlayerResult<()> {
    let mut body = response.bytes_stream();
    let mut splitter = metaint.map(IcySplitter::new);
    let mut last_title: Option<String> = None;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            chunk = body.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(PlayerError::Network(e.to_string())),
            // Live streams don't end; treat EOF as a dropped connection
            None => return Err(PlayerError::Network("stream ended".into())),
        };

        let audio = match splitter.as_mut() {
            Some(splitter) => {
                let mut audio = Vec::with_capacity(chunk.len());
                for raw_meta in splitter.push(&chunk, &mut audio) {
                    if let Some(title) = parse_stream_title(&raw_meta) {
                        if last_title.as_deref() != Some(title.as_str()) {
                            last_title = Some(title.clone());
                            let _ = events_tx.send(PlayerEvent::MetadataChanged { raw: title });
                        }
                    }
                }
                Bytes::from(audio)
            }
            None => chunk,
        };

        if let Some(sink) = audio_sink {
            if sink.send(audio).await.is_err() {
                // Sink consumer is gone; keep the stream open for metadata
                log::debug!("[IcyBackend] Audio sink closed");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ICY Demuxing
// ─────────────────────────────────────────────────────────────────────────────

enum IcyPhase {
    Audio(usize),
    MetaLength,
    Meta(usize),
}

/// Incremental splitter for ICY-interleaved streams.
///
/// After every `metaint` audio bytes the server inserts one length byte
/// (count of 16-byte blocks) followed by that many metadata bytes. Chunk
/// boundaries can fall anywhere, so the splitter carries its phase across
/// calls.
struct IcySplitter {
    metaint: usize,
    phase: IcyPhase,
    meta_buf: Vec<u8>,
}

impl IcySplitter {
    fn new(metaint: usize) -> Self {
        Self {
            metaint,
            phase: IcyPhase::Audio(metaint),
            meta_buf: Vec::new(),
        }
    }

    /// Consumes one chunk, appending audio bytes to `audio` and returning
    /// any complete metadata strings found.
    fn push(&mut self, chunk: &[u8], audio: &mut Vec<u8>) -> Vec<String> {
        let mut metadata = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            match self.phase {
                IcyPhase::Audio(remaining) => {
                    let take = remaining.min(rest.len());
                    audio.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    if take == remaining {
                        self.phase = IcyPhase::MetaLength;
                    } else {
                        self.phase = IcyPhase::Audio(remaining - take);
                    }
                }
                IcyPhase::MetaLength => {
                    let length = rest[0] as usize * 16;
                    rest = &rest[1..];
                    if length == 0 {
                        self.phase = IcyPhase::Audio(self.metaint);
                    } else {
                        self.meta_buf.clear();
                        self.phase = IcyPhase::Meta(length);
                    }
                }
                IcyPhase::Meta(remaining) => {
                    let take = remaining.min(rest.len());
                    self.meta_buf.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    if take == remaining {
                        let text = String::from_utf8_lossy(&self.meta_buf)
                            .trim_end_matches('\0')
                            .to_string();
                        if !text.is_empty() {
                            metadata.push(text);
                        }
                        self.phase = IcyPhase::Audio(self.metaint);
                    } else {
                        self.phase = IcyPhase::Meta(remaining - take);
                    }
                }
            }
        }

        metadata
    }
}

/// Extracts the `StreamTitle` value from a raw ICY metadata string.
fn parse_stream_title(raw: &str) -> Option<String> {
    let start = raw.find("StreamTitle='")? + "StreamTitle='".len();
    let end = raw[start..].find("';")? + start;
    let title = raw[start..end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
