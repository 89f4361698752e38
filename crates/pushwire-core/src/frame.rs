//! Stream framing: `data: <json>\n\n`.
//!
//! Encoding is a single `data:` line holding compact JSON (which never
//! contains a raw newline) followed by a blank line.
//!
//! Parsing accepts the SSE subset a consumer may meet behind proxies:
//! - `\n` or `\r\n` line endings
//! - `:` comment lines (skipped)
//! - `event:`, `id:`, `retry:` and other fields (ignored)
//! - several `data:` lines in one frame (joined with `\n`)
//! - frames with no `data:` line (skipped)
//!
//! Parsing rules:
//! - The buffer grows with the input; there is no frame size cap.
//! - Never index (`buf[i]`); use `get` and length checks.
//! - Any framing violation is `MalformedFrame`; there is no partial recovery.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, PushwireError};
use crate::event::Envelope;

const DATA_PREFIX: &[u8] = b"data: ";
const FRAME_END: &[u8] = b"\n\n";

/// Encode an envelope into one self-delimited frame.
pub fn encode_frame(env: &Envelope) -> Result<Bytes> {
    let json = serde_json::to_vec(env)
        .map_err(|e| PushwireError::Internal(format!("envelope encode failed: {e}")))?;
    let mut out = BytesMut::with_capacity(DATA_PREFIX.len() + json.len() + FRAME_END.len());
    out.put_slice(DATA_PREFIX);
    out.put_slice(&json);
    out.put_slice(FRAME_END);
    Ok(out.freeze())
}

/// Incremental frame parser.
///
/// Feed raw chunks with [`push`](Self::push) in arrival order, then drain
/// complete envelopes with [`next_frame`](Self::next_frame). Call
/// [`finish`](Self::finish) once the byte stream ends.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
    /// Prefix of `buf` already searched for a frame boundary.
    scanned: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete envelope, if one is buffered.
    ///
    /// `Ok(None)` means more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>> {
        loop {
            let Some((body_len, sep_len)) = self.find_boundary() else {
                self.scanned = self.buf.len();
                return Ok(None);
            };

            let raw = self.buf.split_to(body_len + sep_len);
            self.scanned = 0;

            let body = raw.get(..body_len).unwrap_or_default();
            if let Some(env) = parse_block(body)? {
                return Ok(Some(env));
            }
        }
    }

    /// Check that the stream ended on a frame boundary.
    ///
    /// Trailing whitespace or comment lines are tolerated; any other
    /// leftover means the last frame was truncated.
    pub fn finish(&self) -> Result<()> {
        let rest = std::str::from_utf8(&self.buf).map_err(|_| {
            PushwireError::MalformedFrame("stream ended inside a non-utf8 frame".into())
        })?;
        let dangling = rest
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .any(|l| !l.trim().is_empty() && !l.starts_with(':'));
        if dangling {
            return Err(PushwireError::MalformedFrame(format!(
                "stream ended inside a frame ({} bytes buffered)",
                self.buf.len()
            )));
        }
        Ok(())
    }

    /// Locate the first blank line: returns (frame body length, separator length).
    fn find_boundary(&self) -> Option<(usize, usize)> {
        // Re-check the last two bytes: a separator may straddle chunks.
        let mut pos = self.scanned.saturating_sub(2);
        while let Some(rel) = self.buf.get(pos..)?.iter().position(|&b| b == b'\n') {
            let nl = pos + rel;
            match (self.buf.get(nl + 1), self.buf.get(nl + 2)) {
                (Some(b'\n'), _) => return Some((nl, 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((nl, 3)),
                _ => pos = nl + 1,
            }
        }
        None
    }
}

/// Parse one frame body (the lines before the blank separator).
fn parse_block(body: &[u8]) -> Result<Option<Envelope>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| PushwireError::MalformedFrame(format!("frame is not utf-8: {e}")))?;

    let mut data: Option<String> = None;
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        if field != "data" {
            tracing::trace!(field, "ignoring stream field");
            continue;
        }
        match data.as_mut() {
            Some(d) => {
                d.push('\n');
                d.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    let Some(data) = data else {
        return Ok(None);
    };

    let env: Envelope = serde_json::from_str(&data)
        .map_err(|e| PushwireError::MalformedFrame(format!("invalid envelope json: {e}")))?;
    Ok(Some(env))
}
