use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use logsieve_types::Record;

/// Default cap on the bytes retained while waiting for a frame to complete.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Decoding failure surfaced by [`FrameDecoder::feed`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream held something other than a JSON value. The accumulated
    /// buffer has been discarded.
    #[error("malformed stream at byte {offset}: {source}")]
    Malformed {
        offset: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A single frame (or the undecoded tail) grew past the configured cap.
    /// The accumulated buffer has been discarded.
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
}

/// Outcome of one [`FrameDecoder::feed`] call.
///
/// Records decoded before an error are always returned; an error never
/// swallows frames that already parsed.
#[derive(Debug, Default)]
pub struct FeedResult {
    /// Records decoded from this call, in stream order
    pub records: Vec<Record>,

    /// Failure encountered after the last record, if any
    pub error: Option<DecodeError>,
}

/// Stateful decoder for a stream of back-to-back JSON objects.
///
/// The wire carries concatenated objects with no delimiter or length prefix;
/// whitespace between values is permitted. Bytes may arrive in arbitrary
/// chunks, so an incomplete trailing value is retained and completed by a
/// later feed. Output is identical whether the stream arrives one byte at a
/// time or all at once.
pub struct FrameDecoder {
    /// Unconsumed bytes carried between feeds
    buf: Vec<u8>,

    /// Cap on retained bytes; exceeding it discards the buffer
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len: max_frame_len.max(1),
        }
    }

    /// Append bytes and decode every complete frame now available.
    ///
    /// An incomplete trailing value is kept for the next call. A structural
    /// error (bytes that can never become valid JSON) discards the whole
    /// accumulated buffer in favor of forward progress and is reported in
    /// the result for logging; records decoded before the error are still
    /// returned.
    pub fn feed(&mut self, bytes: &[u8]) -> FeedResult {
        self.buf.extend_from_slice(bytes);

        let mut records = Vec::new();
        let mut error = None;
        let mut offset = 0;
        let mut discard = false;

        {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        let end = stream.byte_offset();
                        records.push(Self::to_record(value, &self.buf[offset..end]));
                        offset = end;
                    }
                    // incomplete trailing value, wait for more bytes
                    Some(Err(err)) if err.is_eof() => break,
                    Some(Err(err)) => {
                        error = Some(DecodeError::Malformed {
                            offset: stream.byte_offset(),
                            source: err,
                        });
                        discard = true;
                        break;
                    }
                    None => {
                        // input exhausted cleanly; trailing whitespace carries nothing
                        offset = self.buf.len();
                        break;
                    }
                }
            }
        }

        if discard {
            self.buf.clear();
        } else {
            if offset > 0 {
                self.buf.drain(..offset);
            }
            if self.buf.len() > self.max_frame_len {
                error = Some(DecodeError::FrameTooLarge {
                    max: self.max_frame_len,
                });
                self.buf.clear();
            }
        }

        FeedResult { records, error }
    }

    /// Drop any partially accumulated frame.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently retained while waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Map a parsed JSON value onto a record.
    ///
    /// A payload without a usable logger name becomes a synthetic SYSTEM
    /// error record carrying the raw payload text, so bad producers are
    /// visible to the consumer instead of silently dropped.
    fn to_record(value: Value, raw: &[u8]) -> Record {
        let logger = value
            .get("logger")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if logger.is_empty() {
            let payload = String::from_utf8_lossy(raw);
            return Record::system(payload.trim());
        }

        let level = value
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(exception) = value.get("exception").and_then(Value::as_str) {
            if !exception.is_empty() {
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(exception);
            }
        }

        let mut record = Record::new(level, logger, message);
        if let Some(time) = value
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
        {
            record.timestamp = time;
        }
        record
    }
}

/// Producer timestamps are RFC 3339 normally; some emit a bare
/// "YYYY-MM-DD HH:MM:SS.fff" with no zone, taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Some(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|time| time.and_utc())
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
