//! Encoder and decoder for control-channel envelopes.
//!
//! Envelopes are single-line XML documents rooted at `<P2Control>`:
//!
//! ```text
//! <P2Control><Auth>token</Auth><SessionID>id</SessionID>...payload...</P2Control>
//! ```
//!
//! The camera gives no length prefix, so the decoder buffers stream data and
//! splits it at closing root tags.

use crate::error::ProtocolError;
use crate::{ENVELOPE_ROOT, MAX_ENVELOPE_SIZE};
use bytes::{Bytes, BytesMut};
use quick_xml::escape::escape;

const CLOSE_TAG: &[u8] = b"</P2Control>";
const EMPTY_TAG: &[u8] = b"<P2Control/>";

/// Wraps control payloads into outbound envelopes.
pub struct Encoder;

impl Encoder {
    /// Wraps `payload` with the auth token (if any) and the session id.
    ///
    /// The session element is always present; it is empty until the camera
    /// assigns a session. Line breaks are stripped since the wire format is
    /// single-line.
    pub fn wrap(payload: &str, auth_token: Option<&str>, session_id: Option<&str>) -> String {
        let auth = match auth_token {
            Some(token) => format!("<Auth>{}</Auth>", escape(token)),
            None => String::new(),
        };
        let session = escape(session_id.unwrap_or(""));

        let envelope = format!(
            "<{root}>{auth}<SessionID>{session}</SessionID>{payload}</{root}>",
            root = ENVELOPE_ROOT,
        );
        envelope.replace(['\r', '\n'], "")
    }
}

/// Splits a control-channel byte stream into complete envelopes.
pub struct Decoder {
    buffer: BytesMut,
    max_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_size(MAX_ENVELOPE_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_size,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to take the next complete envelope from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. An unterminated envelope
    /// larger than the configured maximum is discarded with an error.
    pub fn decode_envelope(&mut self) -> Result<Option<String>, ProtocolError> {
        let Some(end) = find_boundary(&self.buffer) else {
            if self.buffer.len() > self.max_size {
                let size = self.buffer.len();
                self.buffer.clear();
                return Err(ProtocolError::EnvelopeTooLarge {
                    size,
                    max: self.max_size,
                });
            }
            return Ok(None);
        };

        let frame = self.buffer.split_to(end);
        let text = std::str::from_utf8(&frame).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Some(text.trim().to_string()))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the offset just past the earliest root terminator.
fn find_boundary(buf: &[u8]) -> Option<usize> {
    [CLOSE_TAG, EMPTY_TAG]
        .iter()
        .filter_map(|tag| {
            buf.windows(tag.len())
                .position(|w| w == *tag)
                .map(|pos| pos + tag.len())
        })
        .min()
}
