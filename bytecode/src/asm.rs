//! Text form of instruction streams.
//!
//! One instruction per line, `mnemonic[.kind] [operand]`, exactly as printed
//! by the [`Display`](core::fmt::Display) impl of [`Instruction`]. Anything
//! after `;` is a comment.

use core::str::FromStr;

use thiserror::Error;

use crate::{BytecodeBuilder, Instruction, Kind, UnknownKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty instruction")]
    Empty,
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("`{0}` expects an operand")]
    MissingOperand(&'static str),
    #[error("unexpected operand `{0}`")]
    UnexpectedOperand(String),
    #[error("invalid operand `{0}`")]
    InvalidOperand(String),
    #[error("`{0}` expects a `.<kind>` suffix")]
    MissingKind(&'static str),
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {source}")]
pub struct AssembleError {
    /// 1-based line number.
    pub line: usize,
    pub source: ParseError,
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_number<T: TryFrom<u64>>(text: &str) -> Result<T, ParseError> {
    let invalid = || ParseError::InvalidOperand(text.to_string());
    let value = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => text.parse::<u64>().map_err(|_| invalid())?,
    };
    T::try_from(value).map_err(|_| invalid())
}

impl FromStr for Instruction {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = strip_comment(line).split_whitespace();
        let head = words.next().ok_or(ParseError::Empty)?;
        let operand = words.next();
        if let Some(extra) = words.next() {
            return Err(ParseError::UnexpectedOperand(extra.to_string()));
        }

        let (mnemonic, suffix) = match head.split_once('.') {
            // `push.u8` is a mnemonic of its own, not a kind suffix.
            Some(("push", "u8")) => ("push.u8", None),
            Some((mnemonic, suffix)) => (mnemonic, Some(suffix)),
            None => (head, None),
        };

        let kind = |name: &'static str| -> Result<Kind, ParseError> {
            let suffix = suffix.ok_or(ParseError::MissingKind(name))?;
            Ok(suffix.parse::<Kind>()?)
        };
        let slot = |name: &'static str| -> Result<u16, ParseError> {
            parse_number(operand.ok_or(ParseError::MissingOperand(name))?)
        };
        let no_operand = |instruction: Instruction| match operand {
            Some(extra) => Err(ParseError::UnexpectedOperand(extra.to_string())),
            None => Ok(instruction),
        };

        if suffix.is_some() && !matches!(mnemonic, "initlocal" | "cconv" | "uconv") {
            return Err(ParseError::UnknownMnemonic(head.to_string()));
        }

        match mnemonic {
            "nop" => no_operand(Instruction::Nop),
            "push.u8" => {
                let text = operand.ok_or(ParseError::MissingOperand("push.u8"))?;
                Ok(Instruction::PushU8 { value: parse_number(text)? })
            }
            "loadarg" => Ok(Instruction::LoadArg { slot: slot("loadarg")? }),
            "poparg" => Ok(Instruction::PopArg { slot: slot("poparg")? }),
            "initlocal" => Ok(Instruction::InitLocal {
                kind: kind("initlocal")?,
                slot: slot("initlocal")?,
            }),
            "poplocal" => Ok(Instruction::PopLocal { slot: slot("poplocal")? }),
            "pushlocal" => Ok(Instruction::PushLocal { slot: slot("pushlocal")? }),
            "refslot" => Ok(Instruction::RefSlot { slot: slot("refslot")? }),
            "pusharray" => no_operand(Instruction::PushArray),
            "cconv" => {
                let kind = kind("cconv")?;
                no_operand(Instruction::CheckedConvert { kind })
            }
            "uconv" => {
                let kind = kind("uconv")?;
                no_operand(Instruction::UncheckedConvert { kind })
            }
            "call" => Ok(Instruction::Call { function: slot("call")? }),
            "ret" => no_operand(Instruction::Ret),
            other => Err(ParseError::UnknownMnemonic(other.to_string())),
        }
    }
}

/// Assemble source lines into bytecode. Blank and comment-only lines are
/// skipped but still counted for error line numbers.
pub fn assemble<S: AsRef<str>>(lines: &[S]) -> Result<Vec<u8>, AssembleError> {
    let mut builder = BytecodeBuilder::new();
    for (idx, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        if strip_comment(line).trim().is_empty() {
            continue;
        }
        let instruction = line.parse::<Instruction>().map_err(|source| AssembleError {
            line: idx + 1,
            source,
        })?;
        builder.emit(instruction);
    }
    Ok(builder.into_bytes())
}

/// Assemble a newline separated listing.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, AssembleError> {
    let lines: Vec<&str> = source.lines().collect();
    assemble(&lines)
}
