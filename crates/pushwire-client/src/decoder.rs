//! Pull-style stream decoder.
//!
//! Wraps any chunked byte stream (a `reqwest` body, a test fixture) and
//! yields one envelope per [`advance`](StreamDecoder::advance). The buffer
//! grows with the frame, so there is no size ceiling.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use pushwire_core::error::{PushwireError, Result};
use pushwire_core::frame::FrameParser;
use pushwire_core::Envelope;

pub struct StreamDecoder<S> {
    stream: S,
    parser: FrameParser,
    current: Option<Envelope>,
    done: bool,
    /// Longest wait for the next chunk; `None` waits forever.
    idle_timeout: Option<Duration>,
}

impl<S, E> StreamDecoder<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: FrameParser::new(),
            current: None,
            done: false,
            idle_timeout: None,
        }
    }

    /// Fail with `Timeout` when no bytes arrive for `idle`. A frame that
    /// keeps arriving in chunks is never cut off, however long it takes.
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = Some(idle);
        self
    }

    /// Suspend until the next envelope is available.
    ///
    /// `Ok(false)` on a clean end of stream. Transport failures map to
    /// `Transport`, an idle timeout to `Timeout`, and framing violations
    /// (including a stream cut mid-frame) to `MalformedFrame`. After any of
    /// these the decoder is spent and keeps returning `Ok(false)`.
    pub async fn advance(&mut self) -> Result<bool> {
        self.current = None;
        if self.done {
            return Ok(false);
        }

        loop {
            match self.parser.next_frame() {
                Ok(Some(env)) => {
                    self.current = Some(env);
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }

            let next = match self.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, self.stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.done = true;
                        return Err(PushwireError::Timeout);
                    }
                },
                None => self.stream.next().await,
            };
            match next {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(PushwireError::Transport(e.to_string()));
                }
                None => {
                    self.done = true;
                    self.parser.finish()?;
                    return Ok(false);
                }
            }
        }
    }

    /// Envelope from the last successful `advance`.
    pub fn current(&self) -> Option<&Envelope> {
        self.current.as_ref()
    }

    /// Move the current envelope out (e.g. to hand it to another task).
    pub fn take_current(&mut self) -> Option<Envelope> {
        self.current.take()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.parser.buffered()
    }
}
