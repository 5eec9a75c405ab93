//! Incremental parser for `data: <json>` chat completion streams.
//!
//! Network chunks do not line up with lines (or with UTF-8 characters), so
//! bytes are carried over until a newline arrives. Splitting on `\n` at the
//! byte level is safe because that byte never occurs inside a multi-byte
//! UTF-8 sequence.

use super::types::ChatCompletionChunk;
use crate::ai::StreamCallbacks;
use crate::Error;
use futures::{Stream, StreamExt};
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]\((.*?)\)").expect("markdown link pattern compiles"));

/// A decoded unit of stream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Completed(String),
}

/// Carry-over buffer that yields only complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed. The trailing
    /// partial line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Drain whatever is left once the stream has ended.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Extract the incremental text of a single stream line, if any.
///
/// Blank lines, the `[DONE]` marker, frames without content, and frames that
/// fail to parse all yield `None`; bad frames are logged, never fatal.
pub fn parse_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let payload = trimmed
        .strip_prefix(DATA_PREFIX)
        .map(str::trim_start)
        .unwrap_or(trimmed);
    if payload == DONE_MARKER {
        return None;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk.delta_text(),
        Err(e) => {
            warn!("Skipping unparseable stream line: {} ({})", trimmed, e);
            None
        }
    }
}

/// Find the asset URL in a `[label](url)` markdown link inside one delta.
///
/// Only the given delta is searched; a link split across two deltas is not
/// recognised.
pub fn extract_asset_url(delta: &str) -> Option<&str> {
    MARKDOWN_LINK
        .captures(delta)
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str())
        .filter(|url| !url.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Reading,
    Done,
}

/// Line buffer plus terminal-signal detection.
///
/// Once a delta carrying an asset link is seen the parser stops: later
/// lines, including ones already buffered, are never parsed.
#[derive(Debug)]
pub struct StreamParser {
    lines: LineBuffer,
    state: ParserState,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            state: ParserState::Reading,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.is_done() {
            return Vec::new();
        }
        let lines = self.lines.push(chunk);
        self.process(lines)
    }

    /// Parse the unterminated tail left when the body ends.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.is_done() {
            return Vec::new();
        }
        match self.lines.take_remainder() {
            Some(tail) => self.process(vec![tail]),
            None => Vec::new(),
        }
    }

    fn process(&mut self, lines: Vec<String>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            let Some(delta) = parse_line(&line) else {
                continue;
            };
            let terminal = extract_asset_url(&delta).map(str::to_string);
            events.push(StreamEvent::Delta(delta));
            if let Some(url) = terminal {
                debug!("Stream delivered asset link: {}", url);
                events.push(StreamEvent::Completed(url));
                self.state = ParserState::Done;
                break;
            }
        }
        events
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch(events: Vec<StreamEvent>, callbacks: &mut dyn StreamCallbacks) -> Option<String> {
    for event in events {
        match event {
            StreamEvent::Delta(text) => callbacks.on_message(&text),
            StreamEvent::Completed(url) => {
                callbacks.on_complete(&url);
                return Some(url);
            }
        }
    }
    None
}

/// Consume a chunked body and drive `callbacks` until a terminal signal,
/// a transport error, or the end of the body.
///
/// Returns the asset URL when `on_complete` fired. The body is dropped as
/// soon as the terminal signal is seen, discarding unread data.
pub async fn drive_stream<S, B, E>(body: S, callbacks: &mut dyn StreamCallbacks) -> Option<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut parser = StreamParser::new();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                if let Some(url) = dispatch(parser.feed(bytes.as_ref()), callbacks) {
                    return Some(url);
                }
            }
            Err(e) => {
                warn!("Stream interrupted: {}", e);
                callbacks.on_error(Error::StreamInterrupted(e.to_string()));
                return None;
            }
        }
    }

    if let Some(url) = dispatch(parser.finish(), callbacks) {
        return Some(url);
    }

    callbacks.on_error(Error::InvalidResponseShape(
        "Stream ended without an asset link".to_string(),
    ));
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{CallbackEvent, RecordingCallbacks};
    use futures::stream;
    use std::convert::Infallible;

    const REFERENCE_STREAM: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"here: \"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"[img](https://x/y.png)\"}}]}\n",
        "data: [DONE]\n",
    );

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    async fn run(parts: &[&[u8]]) -> (Option<String>, Vec<CallbackEvent>) {
        let mut callbacks = RecordingCallbacks::new();
        let url = drive_stream(chunks(parts), &mut callbacks).await;
        (url, callbacks.events())
    }

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[tokio::test]
    async fn test_reference_stream_sequence() {
        let (url, events) = run(&[REFERENCE_STREAM.as_bytes()]).await;

        assert_eq!(url.as_deref(), Some("https://x/y.png"));
        assert_eq!(
            events,
            vec![
                CallbackEvent::Message("here: ".to_string()),
                CallbackEvent::Message("[img](https://x/y.png)".to_string()),
                CallbackEvent::Complete("https://x/y.png".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunk_boundaries_do_not_change_output() {
        let body = format!(
            "{}\n{}data: not json\n{}{}data: [DONE]\n",
            delta_line("夢の中で "),
            delta_line("猫が🐱"),
            delta_line("飛ぶ "),
            delta_line("![cat](https://cdn.example.com/猫.png)"),
        );
        let bytes = body.as_bytes();
        let (expected_url, expected) = run(&[bytes]).await;
        assert_eq!(
            expected_url.as_deref(),
            Some("https://cdn.example.com/猫.png")
        );

        for split in 1..bytes.len() {
            let (url, events) = run(&[&bytes[..split], &bytes[split..]]).await;
            assert_eq!(events, expected, "split at byte {split}");
            assert_eq!(url, expected_url);
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let (url, events) = run(&singles).await;
        assert_eq!(events, expected);
        assert_eq!(url, expected_url);

        let sevens: Vec<&[u8]> = bytes.chunks(7).collect();
        let (_, events) = run(&sevens).await;
        assert_eq!(events, expected);
    }

    #[tokio::test]
    async fn test_nothing_delivered_after_completion() {
        let body = format!(
            "{}{}{}",
            delta_line("[a](https://first.png)"),
            delta_line("more text"),
            delta_line("[b](https://second.png)"),
        );

        let (url, events) = run(&[body.as_bytes()]).await;

        assert_eq!(url.as_deref(), Some("https://first.png"));
        assert_eq!(
            events,
            vec![
                CallbackEvent::Message("[a](https://first.png)".to_string()),
                CallbackEvent::Complete("https://first.png".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_parser_stops_consuming_after_terminal() {
        let mut parser = StreamParser::new();
        let events = parser.feed(delta_line("[x](https://done.png)").as_bytes());
        assert!(parser.is_done());
        assert_eq!(events.len(), 2);

        assert!(parser.feed(delta_line("ignored").as_bytes()).is_empty());
        assert!(parser.finish().is_empty());
    }

    #[tokio::test]
    async fn test_trailing_unterminated_line_is_flushed() {
        let body = format!(
            "{}data: {{\"choices\":[{{\"delta\":{{\"content\":\"[v](https://x/v.mp4)\"}}}}]}}",
            delta_line("rendering… ")
        );

        let (url, events) = run(&[body.as_bytes()]).await;

        assert_eq!(url.as_deref(), Some("https://x/v.mp4"));
        assert_eq!(events.last(), Some(&CallbackEvent::Complete("https://x/v.mp4".to_string())));
    }

    #[tokio::test]
    async fn test_stream_without_link_reports_error_once() {
        let body = format!("{}data: [DONE]\n", delta_line("I cannot draw that."));

        let (url, events) = run(&[body.as_bytes()]).await;

        assert_eq!(url, None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], CallbackEvent::Message("I cannot draw that.".to_string()));
        assert!(matches!(events[1], CallbackEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_transport_error_reports_stream_interrupted() {
        let first = delta_line("partial ");
        let body = stream::iter(vec![
            Ok(first.into_bytes()),
            Err("connection reset"),
            Ok(delta_line("[x](https://never.png)").into_bytes()),
        ]);
        let mut callbacks = RecordingCallbacks::new();

        let url = drive_stream(body, &mut callbacks).await;

        assert_eq!(url, None);
        let events = callbacks.events();
        assert_eq!(events[0], CallbackEvent::Message("partial ".to_string()));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], CallbackEvent::Error(msg) if msg.contains("connection reset")));
        assert_eq!(callbacks.completions(), 0);
    }

    #[test]
    fn test_line_buffer_keeps_partial_line() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b":1}\r\ndata: x"), vec!["data: {\"a\":1}\r".to_string()]);
        assert_eq!(buffer.take_remainder().as_deref(), Some("data: x"));
        assert_eq!(buffer.take_remainder(), None);
    }

    #[test]
    fn test_line_buffer_reassembles_split_utf8() {
        let line = "data: 猫\n".as_bytes();
        let mut buffer = LineBuffer::new();
        // Split inside the three-byte encoding of 猫
        assert!(buffer.push(&line[..7]).is_empty());
        assert_eq!(buffer.push(&line[7..]), vec!["data: 猫".to_string()]);
    }

    #[test]
    fn test_parse_line_skips_noise() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("data: [DONE]"), None);
        assert_eq!(parse_line("data: {\"choices\":"), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(
            parse_line("  data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}  ").as_deref(),
            Some("ok")
        );
    }

    #[test]
    fn test_extract_asset_url() {
        assert_eq!(
            extract_asset_url("done ![image](https://x/y.png) enjoy"),
            Some("https://x/y.png")
        );
        assert_eq!(extract_asset_url("[empty]()"), None);
        assert_eq!(extract_asset_url("no link here"), None);
    }

    #[tokio::test]
    async fn test_link_split_across_deltas_is_not_detected() {
        let body = format!(
            "{}{}",
            delta_line("[img](https://x/"),
            delta_line("y.png)")
        );

        let (url, events) = run(&[body.as_bytes()]).await;

        assert_eq!(url, None);
        assert!(matches!(events.last(), Some(CallbackEvent::Error(_))));
    }
}
