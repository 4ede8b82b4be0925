//! Incremental SSE framing.
//!
//! A byte stream is reassembled into events delimited by blank lines
//! (`\n\n` or `\r\n\r\n`). Recognized fields: `event`, `data` (may repeat;
//! joined with `\n`), `id`, `retry`. Comment lines (leading `:`) are
//! skipped. Incomplete trailing bytes stay buffered across socket reads.

/// One framed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Reassembles SSE events from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in; pull complete events out. Consumed bytes are drained;
    /// any trailing partial event remains for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        self.drain_complete()
    }

    /// Flush the remaining buffer at end of body. A well-formed trailing
    /// block (the vendor omitted the final blank line) still yields its
    /// event; whitespace-only trailers yield nothing.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        self.buffer.push_str("\n\n");
        self.drain_complete()
    }

    fn drain_complete(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        loop {
            let lf = self.buffer.find("\n\n").map(|p| (p, 2));
            let crlf = self.buffer.find("\r\n\r\n").map(|p| (p, 4));
            let (pos, delim_len) = match (lf, crlf) {
                (Some(a), Some(b)) => {
                    if a.0 < b.0 {
                        a
                    } else {
                        b
                    }
                }
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };
            let block: String = self.buffer.drain(..pos).collect();
            self.buffer.drain(..delim_len);
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }
}

/// Parse one event block. Returns `None` when the block carries no data
/// (pure comments, field-only blocks, whitespace).
fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => event.event = Some(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            "retry" => event.retry = value.trim().parse().ok(),
            _ => {}
        }
    }

    let data = data_lines.join("\n");
    if data.trim().is_empty() {
        return None;
    }
    event.data = data;
    Some(event)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_complete_event() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"event: message\ndata: {\"hello\":\"world\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "{\"hello\":\"world\"}");
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: first\n\ndata: second\n\n");
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, ["first", "second"]);
    }

    #[test]
    fn partial_event_stays_buffered() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: complete\n\ndata: par");
        assert_eq!(events.len(), 1);
        let events = framer.push(b"tial\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn split_mid_delimiter() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: x\n").is_empty());
        let events = framer.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn crlf_delimiters() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, ["one", "two"]);
    }

    #[test]
    fn repeated_data_lines_join_with_newline() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn all_fields_recognized() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"event: delta\nid: 42\nretry: 5000\ndata: payload\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].retry, Some(5000));
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn comment_lines_skipped() {
        let mut framer = SseFramer::new();
        let events = framer.push(b": keep-alive\n\n: ping\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"").is_empty());
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn whitespace_only_trailer_yields_nothing() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"\n \n").is_empty());
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: tail").is_empty());
        let events = framer.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "tail");
    }

    #[test]
    fn done_sentinel_passes_through() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: [DONE]\n\n");
        assert_eq!(events[0].data, "[DONE]");
    }

    #[test]
    fn data_without_space_after_colon() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data:{\"a\":1}\n\n");
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn events_without_data_are_dropped() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"event: ping\n\n").is_empty());
    }
}
