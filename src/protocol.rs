//! Control channel wire format.
//!
//! Every command is a one byte opcode followed by a fixed size, big endian
//! payload:
//!
//! | opcode | command  | payload                     | length |
//! |--------|----------|-----------------------------|--------|
//! | `0x01` | SetPixel | x: u16, y: u16, r, g, b: u8 | 8      |
//! | `0x02` | Clear    |                             | 1      |
//! | `0x03` | Fill     | r, g, b: u8                 | 4      |
//! | `0x04` | Sync     |                             | 1      |
//!
//! The server answers `Sync` with a single [`ACK`] byte once every earlier
//! command on the same connection has been applied.

use thiserror::Error;

use crate::pixel_buffer::Color;

pub const ACK: u8 = 0x06;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    SetPixel { x: u16, y: u16, color: Color },
    Clear,
    Fill(Color),
    Sync,
}
impl Command {
    const SET_PIXEL: u8 = 0x01;
    const CLEAR: u8 = 0x02;
    const FILL: u8 = 0x03;
    const SYNC: u8 = 0x04;

    pub fn opcode(&self) -> u8 {
        match self {
            Command::SetPixel { .. } => Self::SET_PIXEL,
            Command::Clear => Self::CLEAR,
            Command::Fill(_) => Self::FILL,
            Command::Sync => Self::SYNC,
        }
    }

    /// Encoded size of the command starting with `opcode`, if it is one.
    pub fn encoded_len(opcode: u8) -> Option<usize> {
        match opcode {
            Self::SET_PIXEL => Some(8),
            Self::CLEAR | Self::SYNC => Some(1),
            Self::FILL => Some(4),
            _ => None,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match *self {
            Command::SetPixel { x, y, color } => {
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
                out.extend_from_slice(&[color.r, color.g, color.b]);
            }
            Command::Fill(color) => out.extend_from_slice(&[color.r, color.g, color.b]),
            Command::Clear | Command::Sync => (),
        }
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        self.encode(&mut out);
        out
    }

    // `bytes` is exactly `encoded_len(bytes[0])` long.
    fn decode_exact(bytes: &[u8]) -> Option<Self> {
        let command = match *bytes {
            [Self::SET_PIXEL, x0, x1, y0, y1, r, g, b] => Command::SetPixel {
                x: u16::from_be_bytes([x0, x1]),
                y: u16::from_be_bytes([y0, y1]),
                color: Color::new(r, g, b),
            },
            [Self::CLEAR] => Command::Clear,
            [Self::FILL, r, g, b] => Command::Fill(Color::new(r, g, b)),
            [Self::SYNC] => Command::Sync,
            _ => return None,
        };
        Some(command)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("stream ended inside command {opcode:#04x} ({have} of {need} bytes)")]
    Truncated { opcode: u8, have: usize, need: usize },
}

/// Reassembles commands from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Vec<u8>,
    start: usize,
}
impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.start = 0;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Number of received bytes not yet consumed by a command.
    pub fn pending(&self) -> usize {
        self.pending.len() - self.start
    }

    /// The next complete command, `None` if more bytes are needed.
    pub fn next_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        let rest = &self.pending[self.start..];
        let Some(&opcode) = rest.first() else {
            return Ok(None);
        };
        let need = Command::encoded_len(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;
        let Some(bytes) = rest.get(..need) else {
            return Ok(None);
        };
        let command = Command::decode_exact(bytes).ok_or(ProtocolError::UnknownOpcode(opcode))?;
        self.start += need;
        Ok(Some(command))
    }

    /// Call once the peer has closed its side. Leftover bytes mean the last
    /// command was cut off.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        let rest = &self.pending[self.start..];
        let Some(&opcode) = rest.first() else {
            return Ok(());
        };
        match Command::encoded_len(opcode) {
            Some(need) => Err(ProtocolError::Truncated {
                opcode,
                have: rest.len(),
                need,
            }),
            None => Err(ProtocolError::UnknownOpcode(opcode)),
        }
    }
}
