//! Incremental Server-Sent Events decoder
//!
//! Both the model providers and the MCP transports consume `text/event-stream`
//! bodies. [`SseDecoder`] turns arbitrary byte chunks into complete events,
//! buffering partial lines (and partial UTF-8 sequences) across chunk
//! boundaries.

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// One dispatched SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Value of the `id:` field, if any
    pub id: Option<String>,
}

impl SseEvent {
    /// True for keep-alive events that carry no payload
    pub fn is_ping(&self) -> bool {
        self.event
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case("ping"))
            .unwrap_or(false)
            || self.data.eq_ignore_ascii_case("[ping]")
    }
}

/// Stateful decoder fed with raw body chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block)
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event = SseEvent::default();
    let mut saw_field = false;

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => {
                data_lines.push(value);
                saw_field = true;
            }
            "event" => {
                event.event = Some(value.trim().to_string());
                saw_field = true;
            }
            "id" => {
                event.id = Some(value.trim().to_string());
                saw_field = true;
            }
            // retry: reconnect timing is the caller's business
            _ => {}
        }
    }

    if !saw_field {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Adapt a byte stream into a stream of decoded events
///
/// Transport errors end the stream with an `Err` item.
pub fn decode_stream<S, E>(byte_stream: S) -> impl Stream<Item = std::result::Result<SseEvent, E>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), SseDecoder::new(), std::collections::VecDeque::new(), false),
        |(mut inner, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (inner, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match inner.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        done = true;
                        return Some((Err(e), (inner, decoder, pending, done)));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
