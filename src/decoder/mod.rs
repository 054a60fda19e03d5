//! Event frame decoder: raw bytes in, typed [`StreamEvent`]s out.
//!
//! The execution service delivers `data: <json>` frames over a chunked
//! byte stream, interleaved with blank-line keep-alives and `:` comment
//! lines, terminated by a `[DONE]` sentinel. Chunk boundaries carry no
//! meaning; a frame may arrive split across any number of chunks.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::error::{Result, RunError};
use crate::types::StreamEvent;

/// Prefix marking a payload-carrying line.
pub const DATA_MARKER: &str = "data:";

/// Out-of-band end-of-stream token.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Extract the payload of a data line, or `None` if the line is not a
/// payload candidate. The marker is stripped and the remainder trimmed.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_MARKER).map(str::trim)
}

enum Frame {
    Event(StreamEvent),
    Done,
    Skip,
}

/// Classify one complete line.
///
/// Malformed JSON payloads are dropped with a diagnostic; a single bad
/// frame never aborts the stream.
fn decode_line(line: &str) -> Frame {
    let line = line.trim_end_matches('\r').trim();
    if line.is_empty() || line.starts_with(':') {
        return Frame::Skip;
    }
    let Some(payload) = data_payload(line) else {
        return Frame::Skip;
    };
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Frame::Event(event),
        Err(err) => {
            warn!(%err, payload, "dropping malformed event frame");
            Frame::Skip
        }
    }
}

/// Decode an incrementally delivered byte stream into a lazy, finite,
/// non-restartable sequence of typed events.
///
/// The sequence ends on the sentinel, on the first terminal event
/// (`complete` or `error`), on a transport error, or at end of input.
/// When input ends without the sentinel, any buffered partial line is
/// flushed as a final best-effort line.
pub fn decode_event_stream<S, B>(chunks: S) -> BoxStream<'static, Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<B, RunError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        // Raw bytes, not text: a chunk boundary may fall inside a
        // multibyte character, so conversion waits for a complete line.
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                match decode_line(&String::from_utf8_lossy(&line)) {
                    Frame::Done => return,
                    Frame::Skip => {}
                    Frame::Event(event) => {
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                }
            }
        }

        // EOF without sentinel: flush whatever is still buffered.
        let tail = String::from_utf8_lossy(&buffer);
        if !tail.trim().is_empty() {
            match decode_line(&tail) {
                Frame::Event(event) => yield Ok(event),
                Frame::Done | Frame::Skip => {}
            }
        }
    };
    Box::pin(stream)
}
