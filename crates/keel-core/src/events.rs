//! Resilient consumer of the engine's live event feed.
//!
//! [`EventStream`] presents the feed as an endless sequence of
//! [`EventNotification`]s. A single background task owns the connection and
//! all `StreamState`; it reconnects after every disconnect, resuming with
//! `since=<latest event time>`, until the caller aborts.
//!
//! ```text
//!  Idle ──▶ Connecting ──200──▶ Streaming ──end/error──▶ AwaitingRetry
//!               ▲   │ other status / refused                   │
//!               │   └──────────────────────────────────────────▶│
//!               └───────────────── fixed delay ─────────────────┘
//!
//!  abort() from any state ──▶ Aborted
//! ```
//!
//! Nothing here returns an error to the caller. Connection failures, bad
//! statuses, undecodable frames and read errors all surface as
//! [`EventNotification::Error`] and the feed carries on.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use keel_config::EventsConfig;

use crate::error::ClientError;
use crate::query::Query;
use crate::transport::Transport;

/// Logical path of the event feed.
pub const EVENTS_PATH: &str = "events";

/// One engine event. Opaque apart from its `time` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Value);

impl Event {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The event's `time` attribute in whole seconds, if present and numeric.
    pub fn time(&self) -> Option<i64> {
        let time = self.0.get("time")?;
        time.as_i64().or_else(|| time.as_f64().map(|t| t.floor() as i64))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }
}

/// What the caller observes on an [`EventStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventNotification {
    /// A connection was established (status 200), before any event arrives.
    Connected,
    /// A decoded event.
    Event(Event),
    /// A recoverable failure; the stream keeps going.
    Error(ClientError),
}

/// Consumer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamPhase {
    Idle,
    Connecting,
    Streaming,
    AwaitingRetry,
    Aborted,
}

/// Bookkeeping owned by the consumer task.
#[derive(Debug)]
pub(crate) struct StreamState {
    latest_event_time: Option<i64>,
    active: bool,
    phase: StreamPhase,
    attempts: u64,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            latest_event_time: None,
            active: true,
            phase: StreamPhase::Idle,
            attempts: 0,
        }
    }
}

impl StreamState {
    pub(crate) fn latest_event_time(&self) -> Option<i64> {
        self.latest_event_time
    }

    pub(crate) fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Record an observed event time. Never moves backwards.
    pub(crate) fn observe(&mut self, time: i64) {
        self.latest_event_time = Some(self.latest_event_time.map_or(time, |t| t.max(time)));
    }

    /// Query for the next connection attempt: the caller's query, plus
    /// `since=<latest>` on every reconnect once an event time is known.
    pub(crate) fn query_for_next_attempt(&self, base: &Query) -> Query {
        match self.latest_event_time {
            Some(latest) if self.attempts > 0 => base.merged_since(latest),
            _ => base.clone(),
        }
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.phase = StreamPhase::Connecting;
    }

    fn abort(&mut self) {
        self.active = false;
        self.phase = StreamPhase::Aborted;
    }
}

/// Incremental splitter of the feed body into JSON frames.
///
/// Frames are whitespace- or newline-delimited JSON objects and may arrive
/// split across chunks. Input that fails to parse is reported as a decode
/// error and skipped up to the next `{` or newline.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Feed a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Event, ClientError>> {
        self.buf.extend_from_slice(chunk);
        self.drain()
    }

    /// Flush at end of stream. Leftover partial input is a decode error.
    pub fn finish(&mut self) -> Vec<Result<Event, ClientError>> {
        let mut frames = self.drain();
        if !self.buf.iter().all(u8::is_ascii_whitespace) {
            frames.push(Err(ClientError::Decode(format!(
                "truncated event frame: {}",
                String::from_utf8_lossy(&self.buf)
            ))));
        }
        self.buf.clear();
        frames
    }

    fn drain(&mut self) -> Vec<Result<Event, ClientError>> {
        let mut frames = Vec::new();
        let mut pos = 0;

        loop {
            let rest = &self.buf[pos..];
            let mut values = serde_json::Deserializer::from_slice(rest).into_iter::<Value>();
            match values.next() {
                None => {
                    pos = self.buf.len();
                    break;
                }
                Some(Ok(value)) => {
                    pos += values.byte_offset();
                    frames.push(into_event(value));
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => {
                    frames.push(Err(ClientError::Decode(e.to_string())));
                    pos += resync_offset(rest);
                }
            }
        }

        self.buf.drain(..pos);
        frames
    }
}

/// Where to resume after a frame that failed to parse: the next `{` or
/// newline after the bad frame's first byte, or the end of the buffer.
/// Every event is an object, so no valid frame can start inside the skip.
fn resync_offset(rest: &[u8]) -> usize {
    let start = rest
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(0);
    rest[start + 1..]
        .iter()
        .position(|&b| b == b'{' || b == b'\n')
        .map_or(rest.len(), |offset| start + 1 + offset)
}

fn into_event(value: Value) -> Result<Event, ClientError> {
    if value.is_object() {
        Ok(Event(value))
    } else {
        Err(ClientError::Decode(format!(
            "event frame is not a JSON object: {value}"
        )))
    }
}

/// Caller handle for a running event feed.
///
/// Yields notifications via [`recv`](Self::recv) or as a [`Stream`]. After
/// [`abort`](Self::abort) (or drop) the background task is stopped and no
/// further notifications are delivered, including ones already buffered.
pub struct EventStream {
    rx: mpsc::Receiver<EventNotification>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
    aborted: bool,
}

impl EventStream {
    /// Start consuming the feed through `transport` with the caller's query.
    pub fn start(transport: Transport, query: Query, config: &EventsConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (cancel, cancel_rx) = watch::channel(false);

        let consumer = Consumer {
            transport,
            query,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            tx,
            state: StreamState::default(),
        };
        let task = tokio::spawn(consumer.run(cancel_rx));

        Self {
            rx,
            cancel,
            task,
            aborted: false,
        }
    }

    /// Next notification, or `None` once aborted.
    pub async fn recv(&mut self) -> Option<EventNotification> {
        if self.aborted {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop the feed from any state. Irreversible and idempotent.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        let _ = self.cancel.send(true);
        self.task.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        debug!("event stream aborted");
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl Stream for EventStream {
    type Item = EventNotification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.aborted {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.abort();
    }
}

/// The single task that owns the connection, the retry timer and the state.
struct Consumer {
    transport: Transport,
    query: Query,
    retry_delay: Duration,
    tx: mpsc::Sender<EventNotification>,
    state: StreamState,
}

impl Consumer {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        loop {
            let flow = tokio::select! {
                biased;
                _ = cancel.changed() => ControlFlow::Break(()),
                flow = self.connect_and_stream() => flow,
            };
            if flow.is_break() {
                break;
            }

            self.state.phase = StreamPhase::AwaitingRetry;
            debug!(
                delay_ms = self.retry_delay.as_millis() as u64,
                since = ?self.state.latest_event_time,
                "event feed reconnect scheduled"
            );
            tokio::select! {
                biased;
                _ = cancel.changed() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.state.abort();
        debug!(
            phase = ?self.state.phase(),
            active = self.state.is_active(),
            attempts = self.state.attempts(),
            since = ?self.state.latest_event_time(),
            "event feed consumer stopped"
        );
    }

    /// One connection attempt. `Break` means the caller is gone.
    async fn connect_and_stream(&mut self) -> ControlFlow<()> {
        let query = self.state.query_for_next_attempt(&self.query);
        self.state.begin_attempt();
        let target = self.transport.target(EVENTS_PATH, Some(&query));
        debug!(%target, attempt = self.state.attempts, "connecting to event feed");

        let response = match self.transport.open_stream(&target).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "event feed connection failed");
                return self.emit(EventNotification::Error(e)).await;
            }
        };

        if response.status != 200 {
            let status = response.status;
            let body = response.into_text().await;
            warn!(status, "event feed rejected");
            return self
                .emit(EventNotification::Error(ClientError::Protocol { status, body }))
                .await;
        }

        self.state.phase = StreamPhase::Streaming;
        info!(%target, "event feed connected");
        self.emit(EventNotification::Connected).await?;

        let mut decoder = FrameDecoder::default();
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(&bytes) {
                        self.deliver(frame).await?;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "event feed interrupted");
                    for frame in decoder.finish() {
                        self.deliver(frame).await?;
                    }
                    return self.emit(EventNotification::Error(e)).await;
                }
            }
        }

        for frame in decoder.finish() {
            self.deliver(frame).await?;
        }
        info!(since = ?self.state.latest_event_time, "event feed closed by engine");
        ControlFlow::Continue(())
    }

    async fn deliver(&mut self, frame: Result<Event, ClientError>) -> ControlFlow<()> {
        match frame {
            Ok(event) => {
                if let Some(time) = event.time() {
                    self.state.observe(time);
                }
                self.emit(EventNotification::Event(event)).await
            }
            Err(e) => {
                warn!(error = %e, "skipping undecodable event frame");
                self.emit(EventNotification::Error(e)).await
            }
        }
    }

    async fn emit(&self, notification: EventNotification) -> ControlFlow<()> {
        match self.tx.send(notification).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ok_times(frames: &[Result<Event, ClientError>]) -> Vec<Option<i64>> {
        frames
            .iter()
            .map(|f| f.as_ref().ok().and_then(Event::time))
            .collect()
    }

    #[test]
    fn test_event_time() {
        assert_eq!(Event::new(json!({"time": 100})).time(), Some(100));
        assert_eq!(Event::new(json!({"time": 100.7})).time(), Some(100));
        assert_eq!(Event::new(json!({"time": "100"})).time(), None);
        assert_eq!(Event::new(json!({"status": "start"})).time(), None);
    }

    #[test]
    fn test_decoder_newline_delimited() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"{\"time\":1}\n{\"time\":2}\n");
        assert_eq!(ok_times(&frames), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_decoder_whitespace_delimited() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"{\"time\":1} {\"time\":2}\t{\"time\":3}");
        assert_eq!(ok_times(&frames), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_decoder_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"{\"time\":10,\"sta").is_empty());
        let frames = decoder.push(b"tus\":\"start\"}\n");
        assert_eq!(ok_times(&frames), vec![Some(10)]);
    }

    #[test]
    fn test_decoder_skips_bad_frame_and_continues() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"not json at all\n{\"time\":7}\n");
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(ClientError::Decode(_))));
        assert_eq!(frames[1].as_ref().unwrap().time(), Some(7));
    }

    #[test]
    fn test_decoder_bad_token_split_across_chunks() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"garbage");
        assert!(matches!(frames.as_slice(), [Err(ClientError::Decode(_))]));

        let frames = decoder.push(b" more garbage\n{\"time\":3}\n");
        let times: Vec<_> = frames.iter().filter_map(|f| f.as_ref().ok()).collect();
        assert!(frames.iter().any(Result::is_err));
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].time(), Some(3));
    }

    #[test]
    fn test_decoder_resyncs_on_whitespace_delimited_feed() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"garbage {\"time\":1} {\"time\":2} ");
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Err(ClientError::Decode(_))));
        assert_eq!(ok_times(&frames[1..]), vec![Some(1), Some(2)]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_resyncs_within_a_line() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"garbage {\"time\":1} {\"time\":2}\n");
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Err(ClientError::Decode(_))));
        assert_eq!(ok_times(&frames[1..]), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_decoder_resyncs_without_delimiter() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"oops{\"time\":4}");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1].as_ref().unwrap().time(), Some(4));
    }

    #[test]
    fn test_decoder_does_not_buffer_after_error() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"not json and no newline yet");
        assert!(!frames.is_empty());
        assert!(frames.iter().all(Result::is_err));
        assert!(decoder.buf.is_empty());
    }

    #[test]
    fn test_decoder_rejects_non_object_frames() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"42\n");
        assert!(matches!(frames.as_slice(), [Err(ClientError::Decode(_))]));
    }

    #[test]
    fn test_decoder_finish_reports_truncated_frame() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"{\"time\":").is_empty());
        let frames = decoder.finish();
        assert!(matches!(frames.as_slice(), [Err(ClientError::Decode(_))]));
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_state_time_never_decreases() {
        let mut state = StreamState::default();
        for time in [5, 9, 3, 9, 12, 1] {
            let before = state.latest_event_time();
            state.observe(time);
            assert!(state.latest_event_time() >= before);
        }
        assert_eq!(state.latest_event_time(), Some(12));
    }

    #[test]
    fn test_first_attempt_uses_caller_query() {
        let mut state = StreamState::default();
        let base = Query::new().filter("type", "container");
        state.observe(100);
        assert_eq!(state.query_for_next_attempt(&base), base);
    }

    #[test]
    fn test_reconnect_merges_since() {
        let mut state = StreamState::default();
        let base = Query::new().filter("type", "container");
        state.begin_attempt();
        assert_eq!(state.query_for_next_attempt(&base), base);

        state.observe(100);
        let next = state.query_for_next_attempt(&base);
        assert_eq!(next.get("since"), Some("100"));
        assert_eq!(next.filters(), base.filters());
    }

    #[test]
    fn test_state_abort_is_terminal() {
        let mut state = StreamState::default();
        assert!(state.is_active());
        assert_eq!(state.phase(), StreamPhase::Idle);
        state.begin_attempt();
        assert_eq!(state.phase(), StreamPhase::Connecting);
        state.abort();
        assert!(!state.is_active());
        assert_eq!(state.phase(), StreamPhase::Aborted);
        assert_eq!(state.attempts(), 1);
    }
}
