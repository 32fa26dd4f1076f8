use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

// ─── LineRecord ───────────────────────────────────────────────────────────

/// One stdout line, classified.
#[derive(Debug)]
pub enum LineRecord {
    /// The line is a JSON object.
    Object(Map<String, Value>),
    /// The line starts like JSON (`{` or `[`) but is not a JSON object.
    Malformed {
        line: String,
        source: serde_json::Error,
    },
    /// Anything else: blank lines, stray log output from the CLI or its
    /// wrappers.
    Noise(String),
}

impl LineRecord {
    /// Classify a single line (without its terminator).
    pub fn classify(raw: &str) -> Self {
        let line = raw.trim();
        match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(map) => LineRecord::Object(map),
            Err(source) if line.starts_with('{') || line.starts_with('[') => {
                LineRecord::Malformed {
                    line: line.to_owned(),
                    source,
                }
            }
            Err(_) => LineRecord::Noise(line.to_owned()),
        }
    }
}

// ─── LineDecoder ──────────────────────────────────────────────────────────

/// Splits a byte stream into newline-terminated lines and classifies each.
///
/// Holds at most one line in memory. Bytes that are not valid UTF-8 are
/// replaced rather than failing the stream, so one garbled line only affects
/// itself.
pub struct LineDecoder<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Read the next line. Returns `Ok(None)` at end of input.
    ///
    /// Cancel-safe only between lines: dropping the future mid-line discards
    /// the partial line, which is fine for teardown.
    pub async fn next_record(&mut self) -> std::io::Result<Option<LineRecord>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(LineRecord::classify(&line)))
    }
}
