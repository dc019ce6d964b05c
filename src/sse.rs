//! Server-sent event parsing for streamed job results
//!
//! The result endpoint emits blocks such as
//!
//! ```text
//! event: generating
//! data: null
//!
//! event: complete
//! data: [{"label": "grizzly"}]
//! ```
//!
//! Only `complete` and `error` end a job; everything else is progress or heartbeat.

use std::borrow::Cow;

pub const EVENT_COMPLETE: &str = "complete";
pub const EVENT_ERROR: &str = "error";

/// One parsed event block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent<'a> {
    pub event: Option<&'a str>,
    pub data: Cow<'a, str>,
}

impl SseEvent<'_> {
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, Some(EVENT_COMPLETE | EVENT_ERROR))
    }
}

/// Parse a single block into event name and data.
///
/// Multiple `data:` lines are joined with newlines.
pub fn parse_block(block: &str) -> SseEvent<'_> {
    let mut event: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let data = match data_lines.len() {
        0 => Cow::Borrowed(""),
        1 => Cow::Borrowed(data_lines[0]),
        _ => Cow::Owned(data_lines.join("\n")),
    };

    SseEvent { event, data }
}

/// Split a body into complete blocks. A trailing block without its blank-line
/// terminator is included only when `final_chunk` is set.
pub fn split_blocks(body: &str, final_chunk: bool) -> Vec<&str> {
    let ends = block_ends(body);
    let mut blocks = Vec::with_capacity(ends.len() + 1);
    let mut start = 0;
    for end in ends {
        let block = &body[start..end];
        if !block.trim().is_empty() {
            blocks.push(block);
        }
        start = end;
    }
    if final_chunk && start < body.len() {
        let rest = &body[start..];
        if !rest.trim().is_empty() {
            blocks.push(rest);
        }
    }
    blocks
}

/// Byte offsets just past each blank-line separator
fn block_ends(body: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut start = 0;
    while let Some(len) = first_block_end(&body.as_bytes()[start..]) {
        start += len;
        ends.push(start);
    }
    ends
}

/// Length of the first complete block in `bytes`, separator included.
pub fn first_block_end(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"\r\n\r\n") {
            return Some(i + 4);
        }
        if bytes[i..].starts_with(b"\n\n") {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

/// First terminal event in the body, if one has fully arrived.
pub fn find_terminal(body: &str, final_chunk: bool) -> Option<SseEvent<'_>> {
    split_blocks(body, final_chunk)
        .into_iter()
        .map(parse_block)
        .find(SseEvent::is_terminal)
}

/// Heuristic used when no content type is available
pub fn looks_like_event_stream(body: &str) -> bool {
    body.lines()
        .map(str::trim_start)
        .find(|l| !l.is_empty())
        .is_some_and(|l| l.starts_with("event:") || l.starts_with("data:"))
}
