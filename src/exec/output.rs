// src/exec/output.rs

//! Output multiplexing for a single process.
//!
//! Each output channel is drained by its own reader. A reader splits the byte
//! stream into lines, appends every line to its accumulation buffer and, when
//! a live [`LineSink`] is attached, forwards the line tagged with its channel.
//!
//! Lines from one channel reach the sink in production order. Nothing orders
//! stdout lines relative to stderr lines.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Upper bound on a single buffered line. Longer lines are split into chunks
/// of this size rather than dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub channel: Channel,
    pub text: String,
}

/// The live observer went away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("output sink closed")]
pub struct SinkClosed;

/// Consumer of output lines as they are produced.
///
/// Delivery may wait (backpressure). A failed delivery stops forwarding for
/// the reader that saw it; capture continues regardless.
pub trait LineSink: Send + Sync {
    fn deliver(
        &self,
        line: OutputLine,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send + '_>>;
}

impl LineSink for mpsc::Sender<OutputLine> {
    fn deliver(
        &self,
        line: OutputLine,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send + '_>> {
        Box::pin(async move { self.send(line).await.map_err(|_| SinkClosed) })
    }
}

/// Drain `reader` to EOF (or a read error), accumulating into `buffer`.
///
/// Every line is appended as `line + "\n"`, so the buffer always equals the
/// in-order concatenation of what the sink was offered. A line that fills a
/// whole chunk keeps a terminator that follows it directly, and a chunk never
/// ends inside a UTF-8 sequence.
pub async fn drain_lines<R>(
    reader: R,
    channel: Channel,
    buffer: &mut String,
    sink: Option<&dyn LineSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut forward_to = sink;
    let mut raw = Vec::new();
    let mut carry = Vec::new();

    loop {
        raw.clear();
        raw.append(&mut carry);
        let room = (MAX_LINE_BYTES - raw.len()) as u64;
        let read = (&mut reader).take(room).read_until(b'\n', &mut raw).await;

        let mut done = match read {
            Ok(0) if raw.is_empty() => break,
            Ok(_) => false,
            Err(err) => {
                debug!(?channel, error = %err, "output read failed; stopping reader");
                break;
            }
        };

        if raw.len() == MAX_LINE_BYTES && raw.last() != Some(&b'\n') {
            let tail = incomplete_utf8_tail(&raw);
            if tail > 0 {
                carry.extend(raw.drain(raw.len() - tail..));
            } else if let Err(err) = absorb_terminator(&mut reader, &mut raw, &mut carry).await {
                debug!(?channel, error = %err, "output read failed; stopping reader");
                done = true;
            }
        }

        let text = decode_line(&raw);
        buffer.push_str(&text);
        buffer.push('\n');

        if let Some(sink) = forward_to {
            if sink.deliver(OutputLine { channel, text }).await.is_err() {
                warn!(?channel, "live output sink closed; capturing without forwarding");
                forward_to = None;
            }
        }

        if done {
            break;
        }
    }
}

/// Move a `\n` or `\r\n` that starts right after a full chunk into `raw`.
///
/// A `\r` at the very end of the read buffer is consumed to look past it;
/// when no `\n` follows, it goes to `carry` and starts the next line.
async fn absorb_terminator<R>(
    reader: &mut BufReader<R>,
    raw: &mut Vec<u8>,
    carry: &mut Vec<u8>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let (first, second, available) = {
        let buf = reader.fill_buf().await?;
        (buf.first().copied(), buf.get(1).copied(), buf.len())
    };

    match (first, second) {
        (Some(b'\n'), _) => {
            reader.consume(1);
            raw.push(b'\n');
        }
        (Some(b'\r'), Some(b'\n')) => {
            reader.consume(2);
            raw.extend_from_slice(b"\r\n");
        }
        (Some(b'\r'), None) if available == 1 => {
            reader.consume(1);
            let next = reader.fill_buf().await?.first().copied();
            if next == Some(b'\n') {
                reader.consume(1);
                raw.extend_from_slice(b"\r\n");
            } else {
                carry.push(b'\r');
            }
        }
        _ => {}
    }
    Ok(())
}

/// Length of a UTF-8 sequence cut off at the end of `raw`, or 0.
fn incomplete_utf8_tail(raw: &[u8]) -> usize {
    for back in 1..=raw.len().min(3) {
        let byte = raw[raw.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_terminators() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"tail"), "tail");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"a\rb\n"), "a\rb");
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"ok\xff\n"), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn accumulates_every_line_including_unterminated_tail() {
        let input: &[u8] = b"one\r\ntwo\n\nthree";
        let mut buffer = String::new();

        drain_lines(input, Channel::Stdout, &mut buffer, None).await;

        assert_eq!(buffer, "one\ntwo\n\nthree\n");
    }

    #[tokio::test]
    async fn forwards_lines_tagged_with_channel() {
        let (tx, mut rx) = mpsc::channel::<OutputLine>(8);
        let input: &[u8] = b"a\nb\n";
        let mut buffer = String::new();

        drain_lines(input, Channel::Stderr, &mut buffer, Some(&tx)).await;
        drop(tx);

        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            seen.push(line);
        }
        assert_eq!(
            seen,
            vec![
                OutputLine { channel: Channel::Stderr, text: "a".into() },
                OutputLine { channel: Channel::Stderr, text: "b".into() },
            ]
        );
    }

    #[tokio::test]
    async fn closed_sink_does_not_stop_capture() {
        let (tx, rx) = mpsc::channel::<OutputLine>(1);
        drop(rx);
        let input: &[u8] = b"first\nsecond\n";
        let mut buffer = String::new();

        drain_lines(input, Channel::Stdout, &mut buffer, Some(&tx)).await;

        assert_eq!(buffer, "first\nsecond\n");
    }

    #[tokio::test]
    async fn overlong_lines_are_split_not_lost() {
        let mut input = vec![b'x'; MAX_LINE_BYTES + 10];
        input.push(b'\n');
        let mut buffer = String::new();

        drain_lines(input.as_slice(), Channel::Stdout, &mut buffer, None).await;

        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].len(), 10);
    }

    #[tokio::test]
    async fn line_of_exactly_max_bytes_stays_one_line() {
        let mut input = vec![b'x'; MAX_LINE_BYTES];
        input.extend_from_slice(b"\nnext\n");
        let mut buffer = String::new();

        drain_lines(input.as_slice(), Channel::Stdout, &mut buffer, None).await;

        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "next");
        assert_eq!(buffer.len(), MAX_LINE_BYTES + "\nnext\n".len());
    }

    #[tokio::test]
    async fn crlf_at_chunk_boundary_is_one_terminator() {
        let mut full = vec![b'x'; MAX_LINE_BYTES];
        full.extend_from_slice(b"\r\nafter\n");
        let mut buffer = String::new();
        drain_lines(full.as_slice(), Channel::Stdout, &mut buffer, None).await;
        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "after");

        let mut straddling = vec![b'x'; MAX_LINE_BYTES - 1];
        straddling.extend_from_slice(b"\r\nafter\n");
        let mut buffer = String::new();
        drain_lines(straddling.as_slice(), Channel::Stdout, &mut buffer, None).await;
        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES - 1);
        assert!(!lines[0].ends_with('\r'));
        assert_eq!(lines[1], "after");
    }

    #[tokio::test]
    async fn multibyte_char_is_not_split_across_chunks() {
        let mut input = vec![b'x'; MAX_LINE_BYTES - 1];
        input.extend_from_slice("é\n".as_bytes());
        let mut buffer = String::new();

        drain_lines(input.as_slice(), Channel::Stdout, &mut buffer, None).await;

        assert!(!buffer.contains('\u{fffd}'));
        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES - 1);
        assert_eq!(lines[1], "é");
    }

    #[test]
    fn utf8_tail_detection() {
        assert_eq!(incomplete_utf8_tail(b"abc"), 0);
        assert_eq!(incomplete_utf8_tail(b"ab\xc3"), 1);
        assert_eq!(incomplete_utf8_tail("aé".as_bytes()), 0);
        assert_eq!(incomplete_utf8_tail(b"a\xe2\x82"), 2);
        assert_eq!(incomplete_utf8_tail(b"a\xf0\x9f\x98"), 3);
    }
}
