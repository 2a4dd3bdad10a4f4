use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use anyhow::{Context, Result};

const DATA_PREFIX: &str = "data:";
const READ_CHUNK: usize = 4096;

/// One decoded record of a generate/analyze stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Log(String),
    ImageReady(String),
    TextDelta(String),
    Done(String),
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Log(_) => "log",
            StreamEvent::ImageReady(_) => "image_ready",
            StreamEvent::TextDelta(_) => "text_delta",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            StreamEvent::Log(text)
            | StreamEvent::ImageReady(text)
            | StreamEvent::TextDelta(text)
            | StreamEvent::Done(text)
            | StreamEvent::Error(text) => text,
        }
    }
}

/// Parses a `TAG|payload` body. Unknown tags and bodies without a
/// delimiter are dropped.
pub fn parse_record(body: &str) -> Option<StreamEvent> {
    let (tag, payload) = body.split_once('|')?;
    let payload = payload.to_string();
    match tag.trim() {
        "LOG" => Some(StreamEvent::Log(payload)),
        "IMG" => Some(StreamEvent::ImageReady(payload.trim().to_string())),
        "TXT" => Some(StreamEvent::TextDelta(payload)),
        "DONE" => Some(StreamEvent::Done(payload)),
        "ERR" => Some(StreamEvent::Error(payload)),
        _ => None,
    }
}

/// Extracts the `data:` body of a blank-line separated block.
fn block_body(block: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in block.split('\n') {
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Incremental decoder for the blank-line delimited `data: TAG|payload`
/// stream. Only complete blocks are decoded, so the emitted sequence does
/// not depend on where the transport splits the bytes.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    scan_from: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        // \r never reaches the buffer so CRLF and LF streams split alike.
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.find_separator() {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scan_from = 0;
            if let Some(event) = decode_block(&block[..end]) {
                events.push(event);
            }
        }
        self.scan_from = self.buffer.len().saturating_sub(1);
        events
    }

    /// Decodes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        decode_block(&rest)
    }

    fn find_separator(&self) -> Option<usize> {
        let start = self.scan_from.min(self.buffer.len());
        self.buffer[start..]
            .windows(2)
            .position(|pair| pair == b"\n\n")
            .map(|offset| start + offset)
    }
}

fn decode_block(bytes: &[u8]) -> Option<StreamEvent> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    block_body(&text).and_then(|body| parse_record(&body))
}

/// Pulls events out of any byte source, typically an HTTP response body.
/// Iteration ends after the first terminal event or at end of input.
pub struct EventStream<R> {
    reader: R,
    decoder: StreamDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<R: Read> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: StreamDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.pending.is_empty() && !self.finished {
            let read = match self.reader.read(&mut chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.finished = true;
                    return Err(err).context("event stream read failed");
                }
            };
            if read == 0 {
                self.finished = true;
                if let Some(event) = self.decoder.finish() {
                    self.pending.push_back(event);
                }
                break;
            }
            self.pending.extend(self.decoder.feed(&chunk[..read]));
        }
        Ok(())
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            if let Err(err) = self.fill() {
                return Some(Err(err));
            }
        }
        let event = self.pending.pop_front()?;
        if event.is_terminal() {
            self.finished = true;
            self.pending.clear();
        }
        Some(Ok(event))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use super::{parse_record, EventStream, StreamDecoder, StreamEvent};

    const SAMPLE: &str = "data: LOG|--> [T2I Worker] Loading Pipeline...\n\n\
data: LOG|SUCCESS_OUTPUT:/app/outputs/t2i_001.png\n\n\
data: IMG|/outputs/t2i_001.png\n\n\
data: TXT|<think>hmm</think>\n\n\n\
data: NOPE|ignored\n\n\
data: DONE|Finished in 12.3s\n\n";

    fn decode_whole(input: &[u8]) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(input);
        events.extend(decoder.finish());
        events
    }

    fn decode_chunked(input: &[u8], size: usize) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for chunk in input.chunks(size) {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn decodes_tagged_records() {
        let events = decode_whole(SAMPLE.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::Log("--> [T2I Worker] Loading Pipeline...".to_string()),
                StreamEvent::Log("SUCCESS_OUTPUT:/app/outputs/t2i_001.png".to_string()),
                StreamEvent::ImageReady("/outputs/t2i_001.png".to_string()),
                StreamEvent::TextDelta("<think>hmm</think>".to_string()),
                StreamEvent::Done("Finished in 12.3s".to_string()),
            ]
        );
    }

    #[test]
    fn decoding_is_chunk_boundary_invariant() {
        let whole = decode_whole(SAMPLE.as_bytes());
        for size in 1..=17 {
            assert_eq!(decode_chunked(SAMPLE.as_bytes(), size), whole, "chunk size {size}");
        }
    }

    #[test]
    fn partial_block_is_held_until_separator() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"data: LOG|hal").is_empty());
        assert!(decoder.feed(b"f way\n").is_empty());
        assert_eq!(
            decoder.feed(b"\ndata: ERR|boo"),
            vec![StreamEvent::Log("half way".to_string())]
        );
        assert!(decoder.feed(b"m").is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::Error("boom".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn crlf_streams_decode_like_lf() {
        let crlf = SAMPLE.replace('\n', "\r\n");
        assert_eq!(decode_chunked(crlf.as_bytes(), 3), decode_whole(SAMPLE.as_bytes()));
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let input = "data: TXT|caffè ☕\n\n".as_bytes();
        assert_eq!(
            decode_chunked(input, 1),
            vec![StreamEvent::TextDelta("caffè ☕".to_string())]
        );
    }

    #[test]
    fn unknown_and_malformed_records_are_ignored() {
        assert_eq!(parse_record("PING|1"), None);
        assert_eq!(parse_record("no delimiter"), None);
        assert_eq!(decode_whole(b": comment\n\nevent: x\n\n"), Vec::new());
        assert_eq!(
            parse_record("ERR|Process exited with code 1"),
            Some(StreamEvent::Error("Process exited with code 1".to_string()))
        );
    }

    #[test]
    fn trailing_block_without_separator_is_flushed() {
        assert_eq!(
            decode_whole(b"data: DONE|ok"),
            vec![StreamEvent::Done("ok".to_string())]
        );
    }

    #[test]
    fn event_stream_stops_after_terminal_event() -> anyhow::Result<()> {
        let input = b"data: LOG|a\n\ndata: ERR|boom\n\ndata: LOG|late\n\n";
        let stream = EventStream::new(Trickle {
            data: input,
            step: 5,
        });
        let events = stream.collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(
            events,
            vec![
                StreamEvent::Log("a".to_string()),
                StreamEvent::Error("boom".to_string()),
            ]
        );
        Ok(())
    }
}
