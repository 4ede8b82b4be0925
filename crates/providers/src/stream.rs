//! The streaming runtime.
//!
//! Each stream runs on a dedicated reader task that frames SSE bytes,
//! invokes the provider codec per event, accumulates tool-call argument
//! fragments, and forwards chunks over a bounded channel. The consumer
//! observes a lazy, single-pass sequence of [`StreamChunk`]s ending in
//! exactly one terminal meta chunk.

use crate::http::UsageHook;
use crate::sse::{SseEvent, SseFramer};
use crate::traits::{Provider, ProviderEvent};
use mp_catalog::Model;
use mp_domain::chunk::{MetaChunk, StreamChunk, StreamError, ToolCallFragment};
use mp_domain::context::Context;
use mp_domain::error::{Error, Result};
use mp_domain::message::{ContentPart, Message, Role};
use mp_domain::response::{FinishReason, Response};
use mp_domain::tool::ToolCall;
use mp_domain::usage::Usage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the chunk queue between the reader task and the consumer.
/// A full queue blocks the socket read (backpressure).
pub const STREAM_QUEUE_CAPACITY: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Byte sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where stream bytes come from: a live HTTP response body or replayed
/// transcript chunks.
pub enum ByteSource {
    Http(reqwest::Response),
    Replay(VecDeque<Vec<u8>>),
}

impl ByteSource {
    pub fn replay(chunks: Vec<Vec<u8>>) -> Self {
        ByteSource::Replay(chunks.into())
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            ByteSource::Http(response) => response
                .chunk()
                .await
                .map(|opt| opt.map(|b| b.to_vec()))
                .map_err(|e| Error::Transport(e.to_string())),
            ByteSource::Replay(chunks) => Ok(chunks.pop_front()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call accumulation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    buffer: String,
}

/// Per-stream accumulator: `index -> {id, name, buffer}`. Indices are
/// stable within one assistant turn and reset per stream.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    calls: BTreeMap<u32, PendingToolCall>,
    next_index: u32,
}

impl ToolCallAccumulator {
    /// Record a tool-call start chunk. When the vendor delivers complete
    /// arguments up front (Gemini), the buffer is seeded from them so
    /// finalization reproduces the same object.
    fn register(&mut self, name: &str, arguments: &Value, id: &str, index: Option<u32>) -> u32 {
        let index = index.unwrap_or(self.next_index);
        self.next_index = self.next_index.max(index + 1);
        let entry = self.calls.entry(index).or_default();
        if !id.is_empty() {
            entry.id = id.to_string();
        }
        if !name.is_empty() {
            entry.name = name.to_string();
        }
        if arguments.as_object().is_some_and(|o| !o.is_empty()) {
            entry.buffer = arguments.to_string();
        }
        index
    }

    fn append(&mut self, fragment: &ToolCallFragment) {
        self.next_index = self.next_index.max(fragment.index + 1);
        self.calls
            .entry(fragment.index)
            .or_default()
            .buffer
            .push_str(&fragment.fragment);
    }

    /// Parse each buffered entry (empty buffer -> empty object) and emit
    /// the synthesized tool-call chunks, ordered by index. A buffer that
    /// fails to parse yields an in-band error instead of aborting.
    fn finalize(&mut self) -> Vec<StreamChunk> {
        let mut chunks = Vec::with_capacity(self.calls.len());
        for (index, call) in std::mem::take(&mut self.calls) {
            let arguments = if call.buffer.trim().is_empty() {
                Ok(Value::Object(Default::default()))
            } else {
                serde_json::from_str::<Value>(&call.buffer)
            };
            match arguments {
                Ok(arguments) => {
                    let id = if call.id.is_empty() {
                        ToolCall::new(None, call.name.as_str(), "").id
                    } else {
                        call.id
                    };
                    chunks.push(StreamChunk::ToolCall {
                        name: call.name,
                        arguments,
                        meta: mp_domain::chunk::ToolCallChunkMeta {
                            id,
                            index: Some(index),
                        },
                    });
                }
                Err(e) => {
                    chunks.push(StreamChunk::Meta(MetaChunk {
                        error: Some(StreamError {
                            reason: "invalid_tool_arguments".into(),
                            message: Some(e.to_string()),
                            index: Some(index),
                            id: (!call.id.is_empty()).then_some(call.id),
                        }),
                        ..Default::default()
                    }));
                }
            }
        }
        chunks
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reader task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct StreamJob {
    pub source: ByteSource,
    pub provider: Arc<dyn Provider>,
    pub model: Model,
    pub usage_hook: Option<UsageHook>,
}

/// Spawn the reader task and hand back the consumer-facing stream.
pub(crate) fn spawn_stream(job: StreamJob, cancel: CancellationToken) -> ChunkStream {
    let (tx, rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        Worker::new(job, tx, task_cancel).run().await;
    });
    ChunkStream { rx, cancel }
}

/// Build a chunk stream from replayed byte chunks (fixture transcripts).
/// Each call produces a fresh stream, so replay is restartable.
pub fn stream_from_bytes(
    provider: Arc<dyn Provider>,
    model: Model,
    chunks: Vec<Vec<u8>>,
) -> ChunkStream {
    spawn_stream(
        StreamJob {
            source: ByteSource::replay(chunks),
            provider,
            model,
            usage_hook: None,
        },
        CancellationToken::new(),
    )
}

struct Worker {
    source: ByteSource,
    provider: Arc<dyn Provider>,
    model: Model,
    usage_hook: Option<UsageHook>,
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
    accumulator: ToolCallAccumulator,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    model_echo: Option<String>,
}

/// Outcome of handling one SSE event.
enum EventOutcome {
    Continue,
    Terminal,
    ConsumerGone,
}

impl Worker {
    fn new(job: StreamJob, tx: mpsc::Sender<StreamChunk>, cancel: CancellationToken) -> Self {
        Self {
            source: job.source,
            provider: job.provider,
            model: job.model,
            usage_hook: job.usage_hook,
            tx,
            cancel,
            accumulator: ToolCallAccumulator::default(),
            usage: None,
            finish_reason: None,
            model_echo: None,
        }
    }

    async fn run(mut self) {
        let mut framer = SseFramer::new();
        let mut consumer_gone = false;

        'read: loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Sever the socket and release buffers; no terminal
                    // chunk is owed to a cancelled consumer.
                    return;
                }
                next = self.source.next_chunk() => next,
            };

            match next {
                Ok(Some(bytes)) => {
                    for event in framer.push(&bytes) {
                        match self.handle_event(event).await {
                            EventOutcome::Continue => {}
                            EventOutcome::Terminal => break 'read,
                            EventOutcome::ConsumerGone => {
                                consumer_gone = true;
                                break 'read;
                            }
                        }
                    }
                }
                Ok(None) => {
                    for event in framer.finish() {
                        match self.handle_event(event).await {
                            EventOutcome::Continue => {}
                            EventOutcome::Terminal => break 'read,
                            EventOutcome::ConsumerGone => {
                                consumer_gone = true;
                                break 'read;
                            }
                        }
                    }
                    break 'read;
                }
                Err(e) => {
                    let error = StreamError {
                        reason: "transport".into(),
                        message: Some(e.to_string()),
                        index: None,
                        id: None,
                    };
                    let _ = self
                        .tx
                        .send(StreamChunk::Meta(MetaChunk {
                            error: Some(error),
                            ..Default::default()
                        }))
                        .await;
                    self.finish_reason = Some(FinishReason::Error);
                    break 'read;
                }
            }
        }

        if !consumer_gone {
            self.terminate().await;
        }
    }

    /// Finalize the accumulator, then emit the single terminal meta chunk
    /// enriched with the last observed usage and finish reason.
    async fn terminate(mut self) {
        for chunk in self.accumulator.finalize() {
            if self.tx.send(chunk).await.is_err() {
                return;
            }
        }
        let usage = self
            .usage
            .take()
            .unwrap_or_default()
            .priced(self.model.cost.as_ref());
        if let Some(hook) = &self.usage_hook {
            hook(&self.model, &usage);
        }
        tracing::debug!(
            provider = %self.provider.id(),
            model = %self.model.id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "stream terminated"
        );
        let meta = MetaChunk {
            terminal: true,
            finish_reason: Some(self.finish_reason.unwrap_or(FinishReason::Stop)),
            usage: Some(usage),
            model: self.model_echo.take(),
            ..Default::default()
        };
        let _ = self.tx.send(StreamChunk::Meta(meta)).await;
    }

    async fn handle_event(&mut self, event: SseEvent) -> EventOutcome {
        // The [DONE] sentinel terminates the stream at the runtime level.
        if event.data.trim() == "[DONE]" {
            return EventOutcome::Terminal;
        }

        // Non-object payloads reach the codec unchanged; most codecs
        // ignore them.
        let provider_event = ProviderEvent::from_data(event.event.clone(), &event.data);
        let chunks = self.provider.decode_sse_event(&provider_event, &self.model);

        for chunk in chunks {
            match chunk {
                StreamChunk::Meta(meta) if meta.terminal => {
                    self.absorb_meta(&meta);
                    return EventOutcome::Terminal;
                }
                StreamChunk::Meta(meta) => {
                    self.absorb_meta(&meta);
                    if let Some(fragment) = &meta.tool_call_args {
                        self.accumulator.append(fragment);
                    }
                    if self.tx.send(StreamChunk::Meta(meta)).await.is_err() {
                        return EventOutcome::ConsumerGone;
                    }
                }
                StreamChunk::ToolCall {
                    name,
                    arguments,
                    meta,
                } => {
                    let index =
                        self.accumulator
                            .register(&name, &arguments, &meta.id, meta.index);
                    let mut meta = meta;
                    meta.index = Some(index);
                    let chunk = StreamChunk::ToolCall {
                        name,
                        arguments,
                        meta,
                    };
                    if self.tx.send(chunk).await.is_err() {
                        return EventOutcome::ConsumerGone;
                    }
                }
                other => {
                    if self.tx.send(other).await.is_err() {
                        return EventOutcome::ConsumerGone;
                    }
                }
            }
        }
        EventOutcome::Continue
    }

    fn absorb_meta(&mut self, meta: &MetaChunk) {
        if let Some(usage) = &meta.usage {
            self.usage = Some(match self.usage.take() {
                Some(prev) => prev.merged(usage),
                None => usage.clone(),
            });
        }
        if let Some(reason) = meta.finish_reason {
            self.finish_reason = Some(reason);
        }
        if meta.model.is_some() {
            self.model_echo.clone_from(&meta.model);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consumer surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The consumer half of a stream: a lazy, finite, single-pass sequence of
/// chunks. Dropping it cancels the reader task and severs the socket.
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamChunk>,
    cancel: CancellationToken,
}

impl ChunkStream {
    pub async fn recv(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }

    /// Cancel the stream explicitly, releasing the socket and buffers.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl futures_core::Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A streaming response: the request context plus the chunk sequence.
/// Terminal fields (`message`, `usage`, `finish_reason`) materialize when
/// the stream is collected.
pub struct StreamResponse {
    pub model: Model,
    pub context: Context,
    stream: ChunkStream,
}

impl StreamResponse {
    /// Wrap an already spawned chunk stream. Used by the HTTP pipeline and
    /// by fixture replay.
    pub fn new(model: Model, context: Context, stream: ChunkStream) -> Self {
        Self {
            model,
            context,
            stream,
        }
    }

    pub fn chunks(&mut self) -> &mut ChunkStream {
        &mut self.stream
    }

    pub fn into_chunks(self) -> ChunkStream {
        self.stream
    }

    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.stream.recv().await
    }

    /// Drain the stream and fold it into a completed [`Response`].
    pub async fn collect(mut self) -> Result<Response> {
        let mut collector = StreamCollector::default();
        while let Some(chunk) = self.stream.recv().await {
            collector.observe(&chunk);
        }
        collector.into_response(self.context, &self.model.id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collecting chunks into a Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Folds a chunk sequence into the final assistant message. Tool calls are
/// keyed by index, so the synthesized complete call overwrites the empty
/// start chunk for the same index.
#[derive(Debug, Default)]
pub struct StreamCollector {
    thinking: String,
    text: String,
    tool_calls: BTreeMap<u32, (String, String, Value)>,
    unindexed_seq: u32,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    model: Option<String>,
    errors: Vec<StreamError>,
}

impl StreamCollector {
    pub fn observe(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Text { text } => self.text.push_str(text),
            StreamChunk::Thinking { text } => self.thinking.push_str(text),
            StreamChunk::ToolCall {
                name,
                arguments,
                meta,
            } => {
                let index = meta.index.unwrap_or_else(|| {
                    let i = u32::MAX - self.unindexed_seq;
                    self.unindexed_seq += 1;
                    i
                });
                self.tool_calls
                    .insert(index, (meta.id.clone(), name.clone(), arguments.clone()));
            }
            StreamChunk::Meta(meta) => {
                if let Some(usage) = &meta.usage {
                    self.usage = Some(match self.usage.take() {
                        Some(prev) => prev.merged(usage),
                        None => usage.clone(),
                    });
                }
                if let Some(reason) = meta.finish_reason {
                    self.finish_reason = Some(reason);
                }
                if meta.model.is_some() {
                    self.model.clone_from(&meta.model);
                }
                if let Some(error) = &meta.error {
                    self.errors.push(error.clone());
                }
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_response(self, context: Context, fallback_model: &str) -> Result<Response> {
        if let Some(error) = self.errors.iter().find(|e| e.reason == "transport") {
            return Err(Error::Transport(
                error.message.clone().unwrap_or_else(|| "stream failed".into()),
            ));
        }
        if let Some(error) = self.errors.iter().find(|e| e.reason == "api_error") {
            return Err(Error::Protocol(
                error.message.clone().unwrap_or_else(|| "stream failed".into()),
            ));
        }

        let mut parts: Vec<ContentPart> = Vec::new();
        if !self.thinking.is_empty() {
            parts.push(ContentPart::thinking(self.thinking));
        }
        if !self.text.is_empty() {
            parts.push(ContentPart::text(self.text));
        }
        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for (_, (id, name, arguments)) in self.tool_calls {
            let id = if id.is_empty() {
                mp_domain::tool::generate_call_id()
            } else {
                id
            };
            parts.push(ContentPart::ToolCall {
                id: id.clone(),
                name: name.clone(),
                input: arguments.clone(),
            });
            tool_calls.push(ToolCall::new(Some(id), name, arguments.to_string()));
        }

        let message = if parts.is_empty() {
            None
        } else {
            let mut message = Message::new(Role::Assistant, parts);
            message.tool_calls = tool_calls;
            Some(message)
        };

        let context = match &message {
            Some(m) => context.append(m.clone()),
            None => context,
        };

        Ok(Response {
            id: format!("stream_{}", uuid::Uuid::new_v4()),
            model: self.model.unwrap_or_else(|| fallback_model.to_string()),
            context,
            message,
            usage: self.usage.unwrap_or_default(),
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            provider_meta: Default::default(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accumulator_joins_fragments_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.register("get_weather", &json!({}), "call_1", Some(0));
        acc.append(&ToolCallFragment {
            index: 0,
            fragment: "{\"loca".into(),
        });
        acc.append(&ToolCallFragment {
            index: 0,
            fragment: "tion\":\"Paris\"}".into(),
        });
        let chunks = acc.finalize();
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            StreamChunk::ToolCall {
                name,
                arguments,
                meta,
            } => {
                assert_eq!(name, "get_weather");
                assert_eq!(arguments, &json!({"location": "Paris"}));
                assert_eq!(meta.id, "call_1");
                assert_eq!(meta.index, Some(0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accumulator_interleaved_indices() {
        let mut acc = ToolCallAccumulator::default();
        acc.register("alpha", &json!({}), "a", Some(0));
        acc.register("beta", &json!({}), "b", Some(1));
        acc.append(&ToolCallFragment { index: 1, fragment: "{\"x\":".into() });
        acc.append(&ToolCallFragment { index: 0, fragment: "{\"y\":1}".into() });
        acc.append(&ToolCallFragment { index: 1, fragment: "2}".into() });
        let chunks = acc.finalize();
        assert_eq!(chunks.len(), 2);
        match (&chunks[0], &chunks[1]) {
            (
                StreamChunk::ToolCall { arguments: a, .. },
                StreamChunk::ToolCall { arguments: b, .. },
            ) => {
                assert_eq!(a, &json!({"y": 1}));
                assert_eq!(b, &json!({"x": 2}));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accumulator_empty_buffer_yields_empty_object() {
        let mut acc = ToolCallAccumulator::default();
        acc.register("noop", &json!({}), "call_2", Some(0));
        let chunks = acc.finalize();
        match &chunks[0] {
            StreamChunk::ToolCall { arguments, .. } => assert_eq!(arguments, &json!({})),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accumulator_complete_arguments_survive() {
        // Gemini delivers whole argument objects in the start chunk.
        let mut acc = ToolCallAccumulator::default();
        acc.register("lookup", &json!({"q": "rust"}), "call_3", Some(0));
        let chunks = acc.finalize();
        match &chunks[0] {
            StreamChunk::ToolCall { arguments, .. } => {
                assert_eq!(arguments, &json!({"q": "rust"}))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accumulator_bad_json_is_inband_error() {
        let mut acc = ToolCallAccumulator::default();
        acc.register("broken", &json!({}), "call_4", Some(0));
        acc.append(&ToolCallFragment {
            index: 0,
            fragment: "{\"unterminated".into(),
        });
        let chunks = acc.finalize();
        match &chunks[0] {
            StreamChunk::Meta(meta) => {
                let error = meta.error.as_ref().unwrap();
                assert_eq!(error.reason, "invalid_tool_arguments");
                assert_eq!(error.index, Some(0));
                assert_eq!(error.id.as_deref(), Some("call_4"));
                assert!(!meta.terminal);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn collector_concatenates_text_in_order() {
        let mut collector = StreamCollector::default();
        for piece in ["Hel", "lo ", "world"] {
            collector.observe(&StreamChunk::text(piece));
        }
        assert_eq!(collector.text(), "Hello world");
    }

    #[test]
    fn collector_last_tool_call_per_index_wins() {
        let mut collector = StreamCollector::default();
        collector.observe(&StreamChunk::ToolCall {
            name: "get_weather".into(),
            arguments: json!({}),
            meta: mp_domain::chunk::ToolCallChunkMeta {
                id: "call_1".into(),
                index: Some(0),
            },
        });
        collector.observe(&StreamChunk::ToolCall {
            name: "get_weather".into(),
            arguments: json!({"location": "Paris"}),
            meta: mp_domain::chunk::ToolCallChunkMeta {
                id: "call_1".into(),
                index: Some(0),
            },
        });
        let response = collector
            .into_response(Context::default(), "test-model")
            .unwrap();
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].arguments().unwrap(),
            json!({"location": "Paris"})
        );
    }

    #[test]
    fn collector_orders_thinking_text_tool_calls() {
        let mut collector = StreamCollector::default();
        collector.observe(&StreamChunk::text("answer"));
        collector.observe(&StreamChunk::thinking("mull"));
        collector.observe(&StreamChunk::ToolCall {
            name: "t".into(),
            arguments: json!({}),
            meta: Default::default(),
        });
        collector.observe(&StreamChunk::Meta(MetaChunk::terminal(Some(
            FinishReason::ToolCalls,
        ))));
        let response = collector
            .into_response(Context::default(), "test-model")
            .unwrap();
        let message = response.message.unwrap();
        assert!(matches!(message.content[0], ContentPart::Thinking { .. }));
        assert!(matches!(message.content[1], ContentPart::Text { .. }));
        assert!(matches!(message.content[2], ContentPart::ToolCall { .. }));
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn collector_transport_error_fails_collection() {
        let mut collector = StreamCollector::default();
        collector.observe(&StreamChunk::Meta(MetaChunk {
            error: Some(StreamError {
                reason: "transport".into(),
                message: Some("connection reset".into()),
                index: None,
                id: None,
            }),
            ..Default::default()
        }));
        let err = collector
            .into_response(Context::default(), "m")
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn replayed_stream_is_single_pass_and_terminal() {
        // A tiny fake provider that turns every object event into one text
        // chunk; EOF termination comes from the runtime.
        struct Echo;
        impl Provider for Echo {
            fn id(&self) -> &str {
                "echo"
            }
            fn default_base_url(&self) -> &str {
                "https://invalid.test"
            }
            fn path(&self, _m: &Model, _s: bool) -> String {
                "/echo".into()
            }
            fn auth(&self, _m: &Model, key: &str) -> crate::traits::AuthPlacement {
                crate::traits::AuthPlacement::bearer(key)
            }
            fn encode_body(&self, _r: &crate::traits::ProviderRequest<'_>) -> Result<Value> {
                Ok(json!({}))
            }
            fn decode_response(
                &self,
                _raw: &Value,
                _model: &Model,
            ) -> Result<crate::traits::DecodedResponse> {
                unimplemented!("non-streaming not used here")
            }
            fn decode_sse_event(
                &self,
                event: &ProviderEvent,
                _model: &Model,
            ) -> Vec<StreamChunk> {
                match event.field("text").and_then(|t| t.as_str()) {
                    Some(text) => vec![StreamChunk::text(text)],
                    None => Vec::new(),
                }
            }
        }

        let model = test_model();
        let bytes = vec![
            b"data: {\"text\":\"a\"}\n\n".to_vec(),
            b"data: {\"text\":\"b\"}\n\ndata: {\"text\":\"c\"}\n\n".to_vec(),
        ];
        let mut stream = stream_from_bytes(Arc::new(Echo), model, bytes);

        let mut texts = String::new();
        let mut terminal_seen = 0;
        while let Some(chunk) = stream.recv().await {
            match chunk {
                StreamChunk::Text { text } => texts.push_str(&text),
                StreamChunk::Meta(meta) if meta.terminal => terminal_seen += 1,
                _ => {}
            }
        }
        assert_eq!(texts, "abc");
        assert_eq!(terminal_seen, 1);
        // Exhausted: subsequent reads yield nothing (single-pass).
        assert!(stream.recv().await.is_none());
    }

    fn test_model() -> Model {
        Model {
            provider: "echo".into(),
            id: "echo-1".into(),
            limits: Default::default(),
            cost: None,
            capabilities: Default::default(),
            max_tokens: None,
            api: Default::default(),
            category: None,
            metadata: Default::default(),
        }
    }
}
