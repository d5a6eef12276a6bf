//! The on-disk program container.
//!
//! All integers are little-endian:
//!
//! ```text
//! magic      BINARY_MAGIC
//! flags      u8                      BinaryFlags
//! entry      u32                     absent for libraries
//! types      u16 count, then count × (u16 len, len bytes)
//! strings    u32 len, then len bytes of (u32 len, utf-8) records
//! functions  u16 count, then count × (u16 len, len bytes of FunctionRecord)
//! code       u32 len, then len bytes
//! source map u16 count, then count × (u16 len, len bytes)   if HAS_SOURCE_MAP
//! ```
//!
//! Type and source map records are carried opaquely: they are skipped on
//! read and never written.

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::{Function, Program};

pub const BINARY_MAGIC: &[u8; 17] = b"foo-binary-v0.0.1";

/// Size of a function record: name, arity, locals, returns, address, size.
const FUNCTION_RECORD_SIZE: usize = 4 + 2 + 2 + 2 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinaryFlags(u8);

impl BinaryFlags {
    pub const NONE: BinaryFlags = BinaryFlags(0);
    /// No entrypoint is stored.
    pub const IS_LIBRARY: BinaryFlags = BinaryFlags(1);
    pub const HAS_SOURCE_MAP: BinaryFlags = BinaryFlags(2);

    const ALL: [(BinaryFlags, &'static str); 2] = [
        (BinaryFlags::IS_LIBRARY, "IsLibrary"),
        (BinaryFlags::HAS_SOURCE_MAP, "HasSourceMap"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Option<BinaryFlags> {
        if bits & !(Self::IS_LIBRARY.0 | Self::HAS_SOURCE_MAP.0) != 0 {
            return None;
        }
        Some(BinaryFlags(bits))
    }

    pub const fn contains(self, other: BinaryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: BinaryFlags) -> BinaryFlags {
        BinaryFlags(self.0 | other.0)
    }
}

impl fmt::Display for BinaryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == BinaryFlags::NONE {
            return f.write_str("None");
        }
        let mut first = true;
        for (flag, name) in BinaryFlags::ALL {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BinaryError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a program binary")]
    BadMagic,
    #[error("unknown flag bits {0:#04x}")]
    UnknownFlags(u8),
    #[error("entrypoint {0} names no function")]
    BadEntry(u32),
    #[error("string at {0:#x} is out of bounds or not utf-8")]
    BadString(u32),
    #[error("function #{0} record is truncated")]
    ShortRecord(usize),
    #[error("function `{0}` code lies outside the bytecode blob")]
    CodeOutOfRange(String),
    #[error("{0} does not fit the binary format")]
    TooLarge(&'static str),
    #[error("{0} trailing bytes after the program")]
    TrailingBytes(usize),
}

/// What a binary holds, as read from its header and tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryInfo {
    pub flags: BinaryFlags,
    pub entry: Option<u32>,
    pub types: usize,
    pub strings: usize,
    /// Size of the string table without its length prefixes.
    pub string_bytes: usize,
    pub functions: usize,
    pub code_bytes: usize,
    pub source_maps: usize,
}

impl Program {
    /// Serializes the program into the binary container.
    pub fn to_binary(&self) -> Result<Vec<u8>, BinaryError> {
        let mut out = Vec::new();
        write_program(&mut out, self)?;
        Ok(out)
    }

    pub fn from_binary(mut bytes: &[u8]) -> Result<Self, BinaryError> {
        read_program(&mut bytes).map(|(program, _)| program)
    }
}

pub fn write_program(w: &mut dyn Write, program: &Program) -> Result<(), BinaryError> {
    let mut strings = Vec::new();
    let mut code = Vec::new();
    let mut records = Vec::with_capacity(program.functions().len());

    for function in program.functions() {
        let name = len_u32(strings.len(), "string table")?;
        write_u32(&mut strings, len_u32(function.name.len(), "function name")?)?;
        strings.extend_from_slice(function.name.as_bytes());

        let address = len_u32(code.len(), "bytecode")?;
        let size = len_u32(function.code.len(), "function code")?;
        code.extend_from_slice(&function.code);

        let mut record = Vec::with_capacity(FUNCTION_RECORD_SIZE);
        write_u32(&mut record, name)?;
        write_u16(&mut record, function.arity)?;
        write_u16(&mut record, function.locals)?;
        write_u16(&mut record, function.returns)?;
        write_u32(&mut record, address)?;
        write_u32(&mut record, size)?;
        records.push(record);
    }

    let flags = match program.entry() {
        Some(_) => BinaryFlags::NONE,
        None => BinaryFlags::IS_LIBRARY,
    };

    w.write_all(BINARY_MAGIC)?;
    write_u8(w, flags.bits())?;
    if let Some(entry) = program.entry() {
        write_u32(w, u32::from(entry))?;
    }
    write_u16(w, 0)?;
    write_u32(w, len_u32(strings.len(), "string table")?)?;
    w.write_all(&strings)?;
    let count = u16::try_from(records.len()).map_err(|_| BinaryError::TooLarge("function table"))?;
    write_u16(w, count)?;
    for record in &records {
        write_u16(w, FUNCTION_RECORD_SIZE as u16)?;
        w.write_all(record)?;
    }
    write_u32(w, len_u32(code.len(), "bytecode")?)?;
    w.write_all(&code)?;

    log::debug!(
        "binary: wrote {} functions, {} bytes of code",
        records.len(),
        code.len()
    );
    Ok(())
}

/// Reads a whole binary. Anything after the last section is an error.
pub fn read_program(r: &mut dyn Read) -> Result<(Program, BinaryInfo), BinaryError> {
    let mut magic = [0u8; BINARY_MAGIC.len()];
    r.read_exact(&mut magic).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => BinaryError::BadMagic,
        _ => BinaryError::Io(err),
    })?;
    if &magic != BINARY_MAGIC {
        return Err(BinaryError::BadMagic);
    }

    let bits = read_u8(r)?;
    let flags = BinaryFlags::from_bits(bits).ok_or(BinaryError::UnknownFlags(bits))?;
    let entry = if flags.contains(BinaryFlags::IS_LIBRARY) {
        None
    } else {
        Some(read_u32(r)?)
    };

    let types = read_u16(r)? as usize;
    for _ in 0..types {
        read_blob_u16(r)?;
    }

    let strings_len = read_u32(r)? as usize;
    let strings = read_blob(r, strings_len)?;

    let count = read_u16(r)? as usize;
    let mut records = Vec::with_capacity(count);
    for idx in 0..count {
        let blob = read_blob_u16(r)?;
        if blob.len() < FUNCTION_RECORD_SIZE {
            return Err(BinaryError::ShortRecord(idx));
        }
        let mut record = blob.as_slice();
        records.push((
            read_u32(&mut record)?,
            read_u16(&mut record)?,
            read_u16(&mut record)?,
            read_u16(&mut record)?,
            read_u32(&mut record)? as usize,
            read_u32(&mut record)? as usize,
        ));
    }

    let code_len = read_u32(r)? as usize;
    let code = read_blob(r, code_len)?;

    let mut source_maps = 0;
    if flags.contains(BinaryFlags::HAS_SOURCE_MAP) {
        source_maps = read_u16(r)? as usize;
        for _ in 0..source_maps {
            read_blob_u16(r)?;
        }
    }

    let mut rest = Vec::new();
    r.read_to_end(&mut rest)?;
    if !rest.is_empty() {
        return Err(BinaryError::TrailingBytes(rest.len()));
    }

    let string_count = count_strings(&strings);
    let mut program = Program::new();
    for (name, arity, locals, returns, address, size) in records {
        let name = string_at(&strings, name)?;
        let body = address
            .checked_add(size)
            .and_then(|end| code.get(address..end))
            .ok_or_else(|| BinaryError::CodeOutOfRange(name.clone()))?;
        let function = Function::new(name, arity, locals, returns, body.to_vec());
        program
            .add_function(function)
            .ok_or(BinaryError::TooLarge("function table"))?;
    }
    if let Some(entry) = entry {
        let idx = u16::try_from(entry)
            .ok()
            .filter(|idx| program.function(*idx).is_some())
            .ok_or(BinaryError::BadEntry(entry))?;
        program.set_entry(idx);
    }

    let info = BinaryInfo {
        flags,
        entry,
        types,
        strings: string_count,
        string_bytes: strings.len().saturating_sub(4 * string_count),
        functions: count,
        code_bytes: code.len(),
        source_maps,
    };
    Ok((program, info))
}

fn string_at(strings: &[u8], offset: u32) -> Result<String, BinaryError> {
    let bad = || BinaryError::BadString(offset);
    let start = offset as usize;
    let mut prefix = strings.get(start..).ok_or_else(bad)?;
    let len = read_u32(&mut prefix).map_err(|_| bad())? as usize;
    let bytes = prefix.get(..len).ok_or_else(bad)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| bad())
}

fn count_strings(mut strings: &[u8]) -> usize {
    let mut count = 0;
    while let Ok(len) = read_u32(&mut strings) {
        let Some(rest) = strings.get(len as usize..) else {
            break;
        };
        strings = rest;
        count += 1;
    }
    count
}

fn len_u32(len: usize, what: &'static str) -> Result<u32, BinaryError> {
    u32::try_from(len).map_err(|_| BinaryError::TooLarge(what))
}

fn read_blob(r: &mut dyn Read, len: usize) -> io::Result<Vec<u8>> {
    let mut blob = Vec::new();
    (&mut *r).take(len as u64).read_to_end(&mut blob)?;
    if blob.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    Ok(blob)
}

fn read_blob_u16(r: &mut dyn Read) -> io::Result<Vec<u8>> {
    let len = read_u16(r)? as usize;
    read_blob(r, len)
}

fn write_u8(w: &mut dyn Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_u8(r: &mut dyn Read) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn write_u16(w: &mut dyn Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u16(r: &mut dyn Read) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}
