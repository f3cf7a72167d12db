//! ESL frame reader
//!
//! Turns the control-link byte stream into frames. A frame ends at a blank
//! line. When a header block names a `Content-Length`, its body is joined
//! to it with one `\n` and the pair is emitted as a single frame.
//!
//! Two body strategies are supported (see [`FramingMode`]):
//!
//! - `ContentLength` reads exactly the announced number of bytes, so a body
//!   containing a blank line cannot desynchronize the stream.
//! - `NextFrame` treats the next blank-line delimited chunk as the body,
//!   matching older gateways that never counted bytes.

use bytes::{Buf, BufMut, BytesMut};
use callgate_core::config::FramingMode;
use callgate_core::GatewayError;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::constants::{DELIMITER, MAX_FRAME_SIZE};

const CONTENT_LENGTH: &str = "Content-Length";

#[derive(Debug)]
enum DecodeState {
    WaitingForHeaders,
    WaitingForBody { head: BytesMut, length: usize },
    WaitingForNextFrame { head: BytesMut },
}

/// Codec for the event socket stream
#[derive(Debug)]
pub struct EslCodec {
    mode: FramingMode,
    state: DecodeState,
}

impl EslCodec {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            state: DecodeState::WaitingForHeaders,
        }
    }

    fn check_size(len: usize) -> Result<(), GatewayError> {
        if len > MAX_FRAME_SIZE {
            return Err(GatewayError::EslProtocol(format!(
                "frame of {} bytes exceeds limit {}",
                len, MAX_FRAME_SIZE
            )));
        }
        Ok(())
    }

    /// Declared body length of a header block, if any
    fn body_length(&self, head: &str) -> Result<Option<usize>, GatewayError> {
        let Some(value) = header_value(head, CONTENT_LENGTH) else {
            return Ok(None);
        };

        match self.mode {
            // Presence alone holds the frame; only an explicit zero releases it
            FramingMode::NextFrame => Ok(Some(value.parse().unwrap_or(1))),
            FramingMode::ContentLength => {
                let length: usize = value.parse().map_err(|_| {
                    GatewayError::EslProtocol(format!("invalid Content-Length: {}", value))
                })?;
                Self::check_size(length)?;
                Ok(Some(length))
            }
        }
    }
}

impl Default for EslCodec {
    fn default() -> Self {
        Self::new(FramingMode::default())
    }
}

/// Value of the first `name: value` line in a header block
pub fn header_value<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    block.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == name).then(|| value.trim())
    })
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

fn to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn join(head: &[u8], body: &[u8]) -> String {
    let mut frame = String::with_capacity(head.len() + 1 + body.len());
    frame.push_str(&String::from_utf8_lossy(head));
    frame.push('\n');
    frame.push_str(&String::from_utf8_lossy(body));
    frame
}

impl Decoder for EslCodec {
    type Item = String;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, GatewayError> {
        loop {
            match std::mem::replace(&mut self.state, DecodeState::WaitingForHeaders) {
                DecodeState::WaitingForHeaders => {
                    // Stray terminators left after a byte-counted body
                    while src.first() == Some(&b'\n') && src.get(1) != Some(&b'\n') {
                        src.advance(1);
                    }

                    let Some(pos) = find_delimiter(src) else {
                        Self::check_size(src.len())?;
                        return Ok(None);
                    };

                    let head = src.split_to(pos);
                    src.advance(DELIMITER.len());
                    if head.is_empty() {
                        continue;
                    }

                    match self.body_length(&String::from_utf8_lossy(&head))? {
                        None | Some(0) => return Ok(Some(to_text(&head))),
                        Some(length) => {
                            trace!(length, "Holding header block for body");
                            self.state = match self.mode {
                                FramingMode::ContentLength => {
                                    DecodeState::WaitingForBody { head, length }
                                }
                                FramingMode::NextFrame => {
                                    DecodeState::WaitingForNextFrame { head }
                                }
                            };
                        }
                    }
                }
                DecodeState::WaitingForBody { head, length } => {
                    if src.len() < length {
                        src.reserve(length - src.len());
                        self.state = DecodeState::WaitingForBody { head, length };
                        return Ok(None);
                    }

                    let body = src.split_to(length);
                    return Ok(Some(join(&head, &body)));
                }
                DecodeState::WaitingForNextFrame { head } => {
                    let Some(pos) = find_delimiter(src) else {
                        Self::check_size(head.len() + src.len())?;
                        self.state = DecodeState::WaitingForNextFrame { head };
                        return Ok(None);
                    };

                    let body = src.split_to(pos);
                    src.advance(DELIMITER.len());
                    return Ok(Some(join(&head, &body)));
                }
            }
        }
    }
}

impl Encoder<String> for EslCodec {
    type Error = GatewayError;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<(), GatewayError> {
        dst.reserve(command.len() + DELIMITER.len());
        dst.put_slice(command.as_bytes());
        dst.put_slice(DELIMITER);
        Ok(())
    }
}
