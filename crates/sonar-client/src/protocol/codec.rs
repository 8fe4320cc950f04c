use crate::errors::ProtocolError;

use super::{MessageKind, check_outbound};

/// Terminates a frame.
pub const RECORD_SEPARATOR: u8 = 0x1e;
/// Separates parameters within a frame.
pub const UNIT_SEPARATOR: u8 = 0x1f;

/// Encodes one frame.
///
/// Parameters may not contain either separator.
pub fn encode_frame(kind: MessageKind, params: &[&str]) -> Result<Vec<u8>, ProtocolError> {
    check_outbound(kind, params)?;
    let mut frame = Vec::with_capacity(2 + params.iter().map(|p| p.len() + 1).sum::<usize>());
    let mut code = [0_u8; 4];
    frame.extend_from_slice(kind.code().encode_utf8(&mut code).as_bytes());
    for param in params {
        if param
            .bytes()
            .any(|byte| byte == RECORD_SEPARATOR || byte == UNIT_SEPARATOR)
        {
            return Err(ProtocolError::InvalidParameter((*param).to_owned()));
        }
        frame.push(UNIT_SEPARATOR);
        frame.extend_from_slice(param.as_bytes());
    }
    frame.push(RECORD_SEPARATOR);
    Ok(frame)
}

/// Splits a plaintext byte stream into frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received plaintext.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Removes and returns the next complete, non-empty frame.
    ///
    /// Returns `Ok(None)` when no full frame is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<String>>, ProtocolError> {
        loop {
            let Some(end) = self
                .buffer
                .iter()
                .position(|byte| *byte == RECORD_SEPARATOR)
            else {
                return Ok(None);
            };
            let record: Vec<u8> = self.buffer.drain(..=end).collect();
            let body = record.split_last().map_or(&[][..], |(_, body)| body);
            if body.is_empty() {
                continue;
            }
            let params = body
                .split(|byte| *byte == UNIT_SEPARATOR)
                .map(|param| {
                    std::str::from_utf8(param)
                        .map(str::to_owned)
                        .map_err(|_| ProtocolError::MalformedText)
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(params));
        }
    }
}
