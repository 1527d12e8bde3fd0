//! Streaming response chunks
//!
//! Providers stream completions as server-sent events. [`SseStream`] turns a
//! raw byte stream into SSE `data` payloads; each adapter then maps a payload
//! into a [`ResponseChunk`].

use crate::{LLMError, Result, StopReason, TokenUsage};
use eventsource_stream::{EventStream, EventStreamError};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Lazy sequence of response chunks
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk>>;

/// One increment of a streamed response
///
/// Summing `usage` across every chunk of a stream yields the call total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseChunk {
    /// Text delta carried by this chunk (may be empty)
    pub content: String,
    /// Set on the chunk that ends the response
    pub finish_reason: Option<StopReason>,
    /// Token usage reported with this chunk
    pub usage: Option<TokenUsage>,
    /// The provider event, untouched
    pub raw: Value,
}

impl ResponseChunk {
    /// Fold a later chunk into this one
    pub fn merge(&mut self, next: ResponseChunk) {
        self.content.push_str(&next.content);
        if next.finish_reason.is_some() {
            self.finish_reason = next.finish_reason;
        }
        if let Some(usage) = next.usage {
            self.usage.get_or_insert_with(TokenUsage::default).accumulate(usage);
        }
        self.raw = next.raw;
    }
}

/// Drain a chunk stream into a single chunk holding the full text
///
/// `raw` of the result is the last event seen.
pub async fn collect_chunks(mut stream: ChunkStream) -> Result<ResponseChunk> {
    let mut collected = ResponseChunk::default();
    while let Some(chunk) = stream.next().await {
        collected.merge(chunk?);
    }
    Ok(collected)
}

/// Server-sent-event decoder yielding each event's `data` payload
///
/// Event framing is handled by `eventsource-stream`. Events without data are
/// skipped, and a `[DONE]` payload or the first transport error ends the stream.
pub struct SseStream<S> {
    inner: EventStream<S>,
    finished: bool,
}

impl<S> SseStream<S> {
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self {
            inner: EventStream::new(inner),
            finished: false,
        }
    }
}

impl<S, B, E> SseStream<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]>,
    E: Into<LLMError> + fmt::Display,
{
    /// Map every payload through a provider's event parser
    ///
    /// Events the parser skips (`Ok(None)`) are dropped from the output.
    pub fn into_chunks(self, parse: fn(&str) -> Result<Option<ResponseChunk>>) -> ChunkStream {
        self.filter_map(move |item| {
            let chunk = match item {
                Ok(payload) => parse(&payload).transpose(),
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(chunk)
        })
        .boxed()
    }
}

impl<S, B, E> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<LLMError> + fmt::Display,
{
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            let item = match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                None => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Some(item) => item,
            };

            match item {
                Ok(event) if event.data.is_empty() => {}
                Ok(event) if event.data == "[DONE]" => this.finished = true,
                Ok(event) => return Poll::Ready(Some(Ok(event.data))),
                Err(EventStreamError::Transport(e)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Err(other) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(LLMError::StreamError(other.to_string()))));
                }
            }
        }
    }
}
