use core::{fmt, str::FromStr};

use heap::HeapError;
use thiserror::Error;

use crate::ConvertError;

/// Why an invocation stopped. Every kind is fatal to the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    StackUnderflow,
    StackOverflow,
    StackTypeMismatch,
    InvalidSlot,
    SlotAlreadyConsumed,
    UninitializedRead,
    DanglingReference,
    IndexOutOfRange,
    ConversionOverflow,
    ReturnArityMismatch,
    InvalidInstruction,
    InvalidFunction,
    CodeOverrun,
}

impl TrapKind {
    pub const ALL: [TrapKind; 13] = [
        TrapKind::StackUnderflow,
        TrapKind::StackOverflow,
        TrapKind::StackTypeMismatch,
        TrapKind::InvalidSlot,
        TrapKind::SlotAlreadyConsumed,
        TrapKind::UninitializedRead,
        TrapKind::DanglingReference,
        TrapKind::IndexOutOfRange,
        TrapKind::ConversionOverflow,
        TrapKind::ReturnArityMismatch,
        TrapKind::InvalidInstruction,
        TrapKind::InvalidFunction,
        TrapKind::CodeOverrun,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            TrapKind::StackUnderflow => "StackUnderflow",
            TrapKind::StackOverflow => "StackOverflow",
            TrapKind::StackTypeMismatch => "StackTypeMismatch",
            TrapKind::InvalidSlot => "InvalidSlot",
            TrapKind::SlotAlreadyConsumed => "SlotAlreadyConsumed",
            TrapKind::UninitializedRead => "UninitializedRead",
            TrapKind::DanglingReference => "DanglingReference",
            TrapKind::IndexOutOfRange => "IndexOutOfRange",
            TrapKind::ConversionOverflow => "ConversionOverflow",
            TrapKind::ReturnArityMismatch => "ReturnArityMismatch",
            TrapKind::InvalidInstruction => "InvalidInstruction",
            TrapKind::InvalidFunction => "InvalidFunction",
            TrapKind::CodeOverrun => "CodeOverrun",
        }
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trap kind `{0}`")]
pub struct UnknownTrapKind(pub String);

impl FromStr for TrapKind {
    type Err = UnknownTrapKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrapKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownTrapKind(s.to_owned()))
    }
}

impl From<HeapError> for TrapKind {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::DanglingReference(_) => TrapKind::DanglingReference,
            HeapError::IndexOutOfRange { .. } => TrapKind::IndexOutOfRange,
            HeapError::ElementKind(_) => TrapKind::StackTypeMismatch,
            HeapError::Exhausted => TrapKind::StackOverflow,
        }
    }
}

impl From<ConvertError> for TrapKind {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Overflow { .. } => TrapKind::ConversionOverflow,
            ConvertError::NotNumeric { .. } => TrapKind::StackTypeMismatch,
        }
    }
}

/// A trap together with where it was raised: the function index and the
/// byte offset of the offending instruction (including any `wide` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} in function {function} at {offset:#06x}")]
pub struct Trap {
    pub kind: TrapKind,
    pub function: u16,
    pub offset: usize,
}

/// Problems with the initial activation, found before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("program has no entry function")]
    NoEntry,
    #[error("entry function {0} does not exist")]
    UnknownEntry(u16),
    #[error("entry function takes {expected} arguments, {found} given")]
    ArgumentCount { expected: u16, found: usize },
    #[error("{declared} locals declared, entry function has {available}")]
    TooManyLocals { declared: usize, available: u16 },
    #[error("initial stack holds {depth} values, limit is {limit}")]
    StackTooDeep { depth: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Trap(#[from] Trap),
}

impl InvokeError {
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            InvokeError::Trap(trap) => Some(trap),
            InvokeError::Setup(_) => None,
        }
    }
}
