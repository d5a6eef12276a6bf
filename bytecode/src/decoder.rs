use thiserror::Error;

use crate::{Instruction, Kind, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{byte:02x} at {offset:#06x}")]
    InvalidOpcode { offset: usize, byte: u8 },
    #[error("invalid kind tag 0x{byte:02x} at {offset:#06x}")]
    InvalidKind { offset: usize, byte: u8 },
    #[error("truncated instruction at {offset:#06x}")]
    Truncated { offset: usize },
    #[error("wide prefix before {op:?} at {offset:#06x}")]
    WideNotAllowed { offset: usize, op: Op },
}

/// Decodes a bytecode byte slice into [`Instruction`]s.
///
/// Unlike a trusted in-memory stream the bytes may come from anywhere, so
/// every read is bounds checked and malformed input yields a
/// [`DecodeError`] instead of undefined behaviour.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

/// Decode the instruction starting at `pc`, returning it together with the
/// offset of the following instruction.
pub fn decode_at(bytes: &[u8], pc: usize) -> Result<(Instruction, usize), DecodeError> {
    let mut decoder = BytecodeDecoder { bytes, pos: pc };
    let instruction = decoder.decode()?;
    Ok((instruction, decoder.pos))
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte offset in the stream.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the decoder has reached the end of the bytecode.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `Ok(None)` at end-of-stream.
    ///
    /// On error the decoder stays at the start of the failing instruction.
    pub fn decode_next(&mut self) -> Result<Option<Instruction>, DecodeError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let start = self.pos;
        match self.decode() {
            Ok(instruction) => Ok(Some(instruction)),
            Err(err) => {
                self.pos = start;
                Err(err)
            }
        }
    }

    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let start = self.pos;
        let op = self.read_op()?;

        if op == Op::Wide {
            let next = self.read_op()?;
            if !next.accepts_wide() {
                return Err(DecodeError::WideNotAllowed { offset: start, op: next });
            }
            return self.decode_op(next, true);
        }
        self.decode_op(op, false)
    }

    fn decode_op(&mut self, op: Op, wide: bool) -> Result<Instruction, DecodeError> {
        let instruction = match op {
            Op::Wide => {
                return Err(DecodeError::WideNotAllowed {
                    offset: self.pos - 1,
                    op,
                });
            }
            Op::Nop => Instruction::Nop,
            Op::PushU8 => Instruction::PushU8 { value: self.read_u8()? },
            Op::LoadArg => Instruction::LoadArg { slot: self.read_slot(wide)? },
            Op::PopArg => Instruction::PopArg { slot: self.read_slot(wide)? },
            Op::InitLocal => {
                let kind = self.read_kind()?;
                let slot = self.read_slot(wide)?;
                Instruction::InitLocal { slot, kind }
            }
            Op::PopLocal => Instruction::PopLocal { slot: self.read_slot(wide)? },
            Op::PushLocal => Instruction::PushLocal { slot: self.read_slot(wide)? },
            Op::RefSlot => Instruction::RefSlot { slot: self.read_slot(wide)? },
            Op::PushArray => Instruction::PushArray,
            Op::CheckedConvert => Instruction::CheckedConvert { kind: self.read_kind()? },
            Op::UncheckedConvert => Instruction::UncheckedConvert { kind: self.read_kind()? },
            Op::Call => Instruction::Call { function: self.read_u16()? },
            Op::Ret => Instruction::Ret,
        };
        Ok(instruction)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let end = self.pos + 2;
        let raw = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let v = u16::from_le_bytes([raw[0], raw[1]]);
        self.pos = end;
        Ok(v)
    }

    fn read_op(&mut self) -> Result<Op, DecodeError> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        Op::try_from(byte).map_err(|byte| DecodeError::InvalidOpcode { offset, byte })
    }

    fn read_kind(&mut self) -> Result<Kind, DecodeError> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        Kind::try_from(byte).map_err(|byte| DecodeError::InvalidKind { offset, byte })
    }

    fn read_slot(&mut self, wide: bool) -> Result<u16, DecodeError> {
        if wide {
            self.read_u16()
        } else {
            self.read_u8().map(u16::from)
        }
    }
}

impl<'a> Iterator for BytecodeDecoder<'a> {
    /// `(offset, instruction)`; decoding stops after the first error.
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        match self.decode_next() {
            Ok(Some(instruction)) => Some(Ok((offset, instruction))),
            Ok(None) => None,
            Err(err) => {
                self.pos = self.bytes.len();
                Some(Err(err))
            }
        }
    }
}
