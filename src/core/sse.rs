//! Incremental `text/event-stream` decoding.
//!
//! [`SseParser`] is the state machine: feed it byte chunks of any size and it
//! hands back every event whose frame has been closed by a blank line. Bytes
//! can reach it two ways, both ending in the same [`EventStream`]:
//! - pull, via [`sse_events`], which drains an async byte stream such as
//!   `reqwest::Response::bytes_stream`;
//! - push, via [`push_channel`], for sources that deliver chunks through a
//!   callback.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr2;
use tokio::sync::mpsc;

use crate::core::error::ChatError;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the last `event:` field in the frame, if any.
    pub event: Option<String>,
    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream so far.
    pub id: Option<String>,
}

/// Lazy, finite sequence of events. Ends when the byte source closes and
/// cannot be restarted.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, ChatError>> + Send>>;

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data_lines: Vec<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        self.drain_lines(false, &mut events);
        events
    }

    /// Flush whatever is buffered once the source has closed, dispatching an
    /// unterminated trailing frame.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        self.drain_lines(true, &mut events);
        self.dispatch(&mut events);
        events
    }

    fn drain_lines(&mut self, flush: bool, events: &mut Vec<SseEvent>) {
        let mut start = 0;

        while let Some(relative) = memchr2(b'\n', b'\r', &self.buffer[start..]) {
            let line_end = start + relative;
            let terminator = if self.buffer[line_end] == b'\r' {
                match self.buffer.get(line_end + 1) {
                    Some(b'\n') => 2,
                    Some(_) => 1,
                    // A trailing CR may be the first half of a CRLF.
                    None if flush => 1,
                    None => break,
                }
            } else {
                1
            };

            let line = String::from_utf8_lossy(&self.buffer[start..line_end]).into_owned();
            self.process_line(&line, events);
            start = line_end + terminator;
        }

        if flush && start < self.buffer.len() {
            let line = String::from_utf8_lossy(&self.buffer[start..]).into_owned();
            self.process_line(&line, events);
            start = self.buffer.len();
        }

        self.buffer.drain(..start);
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let event_type = self.event_type.take();
        if self.data_lines.is_empty() {
            return;
        }

        events.push(SseEvent {
            event: event_type,
            data: std::mem::take(&mut self.data_lines).join("\n"),
            id: self.last_event_id.clone(),
        });
    }
}

struct PullState<S> {
    bytes: Pin<Box<S>>,
    parser: SseParser,
    ready: VecDeque<SseEvent>,
    closed: bool,
}

/// Decode an async byte stream into events.
pub fn sse_events<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = PullState {
        bytes: Box::pin(bytes),
        parser: SseParser::new(),
        ready: VecDeque::new(),
        closed: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok::<_, ChatError>(event), state));
            }
            if state.closed {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.feed(chunk.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(err)) => {
                    state.closed = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.closed = true;
                    let events = state.parser.finish();
                    state.ready.extend(events);
                }
            }
        }
    }))
}

/// Push side of [`push_channel`]. Dropping it without [`SsePushFeed::close`]
/// ends the stream without flushing a partial frame.
pub struct SsePushFeed {
    parser: SseParser,
    tx: mpsc::UnboundedSender<SseEvent>,
}

impl SsePushFeed {
    /// Feed one chunk. Returns `false` once the receiving stream is gone.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        for event in self.parser.feed(chunk) {
            if self.tx.send(event).is_err() {
                return false;
            }
        }
        !self.tx.is_closed()
    }

    /// Mark the source closed, flushing any trailing frame.
    pub fn close(mut self) {
        for event in self.parser.finish() {
            if self.tx.send(event).is_err() {
                break;
            }
        }
    }
}

/// A push-fed parser paired with the stream of events it produces.
pub fn push_channel() -> (SsePushFeed, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let feed = SsePushFeed {
        parser: SseParser::new(),
        tx,
    };
    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, ChatError>(event), rx))
    });
    (feed, Box::pin(events))
}
