use core::fmt;

use crate::{BytecodeDecoder, DecodeError, Instruction};

/// One decoded line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub offset: usize,
    pub bytes: Vec<u8>,
    pub instruction: Instruction,
}

/// Disassembly of a code blob. Stops at the first undecodable byte, which is
/// kept in `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub lines: Vec<ListingLine>,
    pub error: Option<DecodeError>,
}

pub fn disassemble(code: &[u8]) -> Listing {
    let mut lines = Vec::new();
    let mut error = None;
    let mut decoder = BytecodeDecoder::new(code);

    loop {
        let offset = decoder.offset();
        match decoder.decode_next() {
            Ok(Some(instruction)) => lines.push(ListingLine {
                offset,
                bytes: code[offset..decoder.offset()].to_vec(),
                instruction,
            }),
            Ok(None) => break,
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }

    Listing { lines, error }
}

impl fmt::Display for ListingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self
            .bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{:#06x} | {hex:<11} | {}", self.offset, self.instruction)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        if let Some(err) = &self.error {
            writeln!(f, "   ?   | ??          | {err}")?;
        }
        Ok(())
    }
}
