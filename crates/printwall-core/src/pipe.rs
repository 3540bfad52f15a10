//! Binary framing between worker print clients and the hub.
//!
//! Each frame is `cmd:u8 | col_idx:u16 | special_id:[u8; 32] | len:u64 | data`,
//! integers little-endian. An empty special id is sent as 32 `'0'` bytes,
//! which is the no-group sentinel on the viewer side.

use crate::protocol::{CloseGroup, Command, OpenGroup, PrintLine};
use crate::token::TOKEN_HEX_LEN;
use thiserror::Error;

pub const MAX_PIPE_PAYLOAD_BYTES: usize = 1024 * 1024;
pub const PIPE_HEADER_BYTES: usize = 1 + 2 + TOKEN_HEX_LEN + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeCommand {
    Print,
    OpenGroup,
    CloseGroup,
}

impl PipeCommand {
    pub fn as_byte(self) -> u8 {
        match self {
            PipeCommand::Print => 0,
            PipeCommand::OpenGroup => 1,
            PipeCommand::CloseGroup => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PipeCommand::Print),
            1 => Some(PipeCommand::OpenGroup),
            2 => Some(PipeCommand::CloseGroup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeFrame {
    pub cmd: PipeCommand,
    pub col_idx: u16,
    pub special_id: String,
    pub data: String,
}

impl PipeFrame {
    pub fn print(col_idx: u16, special_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            cmd: PipeCommand::Print,
            col_idx,
            special_id: special_id.into(),
            data: data.into(),
        }
    }

    /// The viewer-facing command carried by this frame.
    pub fn into_command(self) -> Command {
        let col_idx = usize::from(self.col_idx);
        match self.cmd {
            PipeCommand::Print => Command::Print(PrintLine {
                col_idx,
                special_id: Some(self.special_id),
                data: self.data,
                color: None,
            }),
            PipeCommand::OpenGroup => Command::OpenGroup(OpenGroup {
                col_idx,
                special_id: self.special_id,
            }),
            PipeCommand::CloseGroup => Command::CloseGroup(CloseGroup {
                special_id: self.special_id,
                col_idx: Some(col_idx),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    #[error("unknown pipe command byte {0}")]
    UnknownCommand(u8),
    #[error("pipe payload exceeds max size: {size} > {max}")]
    OversizedPayload { size: u64, max: usize },
    #[error("special id longer than {max} bytes: {len}")]
    SpecialIdTooLong { len: usize, max: usize },
    #[error("pipe frame {field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
}

impl PipeError {
    /// Frame boundaries can no longer be trusted; the stream must be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipeError::UnknownCommand(_) | PipeError::OversizedPayload { .. }
        )
    }
}

pub fn encode_pipe_frame(frame: &PipeFrame) -> Result<Vec<u8>, PipeError> {
    let special_id = frame.special_id.as_bytes();
    if special_id.len() > TOKEN_HEX_LEN {
        return Err(PipeError::SpecialIdTooLong {
            len: special_id.len(),
            max: TOKEN_HEX_LEN,
        });
    }
    let data = frame.data.as_bytes();
    if data.len() > MAX_PIPE_PAYLOAD_BYTES {
        return Err(PipeError::OversizedPayload {
            size: data.len() as u64,
            max: MAX_PIPE_PAYLOAD_BYTES,
        });
    }

    let mut encoded = Vec::with_capacity(PIPE_HEADER_BYTES + data.len());
    encoded.push(frame.cmd.as_byte());
    encoded.extend_from_slice(&frame.col_idx.to_le_bytes());
    encoded.extend_from_slice(special_id);
    encoded.resize(1 + 2 + TOKEN_HEX_LEN, b'0');
    encoded.extend_from_slice(&(data.len() as u64).to_le_bytes());
    encoded.extend_from_slice(data);
    Ok(encoded)
}

#[derive(Debug, Clone)]
pub struct DecodeReport<T> {
    pub frames: Vec<T>,
    pub errors: Vec<PipeError>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> DecodeReport<T> {
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(PipeError::is_fatal)
    }
}

/// Incremental decoder fed with whatever chunks the socket returns.
#[derive(Debug, Default)]
pub struct PipeFrameDecoder {
    pending: Vec<u8>,
    poisoned: bool,
}

impl PipeFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport<PipeFrame> {
        let mut report = DecodeReport::default();
        if self.poisoned {
            return report;
        }
        self.pending.extend_from_slice(chunk);

        let mut cursor = 0;
        while self.pending.len() - cursor >= PIPE_HEADER_BYTES {
            let header = &self.pending[cursor..cursor + PIPE_HEADER_BYTES];
            let Some(cmd) = PipeCommand::from_byte(header[0]) else {
                let byte = header[0];
                self.poison(PipeError::UnknownCommand(byte), &mut report);
                return report;
            };
            let col_idx = u16::from_le_bytes([header[1], header[2]]);
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&header[3 + TOKEN_HEX_LEN..]);
            let len = u64::from_le_bytes(len_bytes);
            if len > MAX_PIPE_PAYLOAD_BYTES as u64 {
                self.poison(
                    PipeError::OversizedPayload {
                        size: len,
                        max: MAX_PIPE_PAYLOAD_BYTES,
                    },
                    &mut report,
                );
                return report;
            }
            let total = PIPE_HEADER_BYTES + len as usize;
            if self.pending.len() - cursor < total {
                break;
            }

            let frame = &self.pending[cursor..cursor + total];
            cursor += total;
            let special_id = std::str::from_utf8(&frame[3..3 + TOKEN_HEX_LEN]);
            let data = std::str::from_utf8(&frame[PIPE_HEADER_BYTES..]);
            match (special_id, data) {
                (Ok(special_id), Ok(data)) => report.frames.push(PipeFrame {
                    cmd,
                    col_idx,
                    special_id: special_id.to_string(),
                    data: data.to_string(),
                }),
                (Err(_), _) => report.errors.push(PipeError::InvalidUtf8 {
                    field: "special_id",
                }),
                (_, Err(_)) => report.errors.push(PipeError::InvalidUtf8 { field: "data" }),
            }
        }

        // Consumed frames leave the buffer in one move per chunk.
        self.pending.drain(..cursor);
        report
    }

    fn poison(&mut self, error: PipeError, report: &mut DecodeReport<PipeFrame>) {
        self.poisoned = true;
        self.pending.clear();
        report.errors.push(error);
    }
}
