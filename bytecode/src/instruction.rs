use core::fmt;

use crate::{Kind, Op};

/// A decoded instruction with all operands resolved to their widest types.
///
/// Slot operands are always `u16` regardless of whether the instruction
/// was encoded in narrow or wide form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    PushU8 {
        value: u8,
    },
    LoadArg {
        slot: u16,
    },
    PopArg {
        slot: u16,
    },
    InitLocal {
        slot: u16,
        kind: Kind,
    },
    PopLocal {
        slot: u16,
    },
    PushLocal {
        slot: u16,
    },
    RefSlot {
        slot: u16,
    },
    PushArray,
    CheckedConvert {
        kind: Kind,
    },
    UncheckedConvert {
        kind: Kind,
    },
    Call {
        function: u16,
    },
    Ret,
}

impl Instruction {
    pub fn op(&self) -> Op {
        match self {
            Self::Nop => Op::Nop,
            Self::PushU8 { .. } => Op::PushU8,
            Self::LoadArg { .. } => Op::LoadArg,
            Self::PopArg { .. } => Op::PopArg,
            Self::InitLocal { .. } => Op::InitLocal,
            Self::PopLocal { .. } => Op::PopLocal,
            Self::PushLocal { .. } => Op::PushLocal,
            Self::RefSlot { .. } => Op::RefSlot,
            Self::PushArray => Op::PushArray,
            Self::CheckedConvert { .. } => Op::CheckedConvert,
            Self::UncheckedConvert { .. } => Op::UncheckedConvert,
            Self::Call { .. } => Op::Call,
            Self::Ret => Op::Ret,
        }
    }

    /// Number of operand stack values the instruction consumes before it
    /// can take effect.
    pub fn stack_inputs(&self) -> usize {
        match self {
            Self::PopLocal { .. }
            | Self::RefSlot { .. }
            | Self::CheckedConvert { .. }
            | Self::UncheckedConvert { .. } => 1,
            Self::PushArray => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.op().mnemonic();
        match self {
            Self::Nop | Self::PushArray | Self::Ret => f.write_str(mnemonic),
            Self::PushU8 { value } => write!(f, "{mnemonic} {value}"),
            Self::LoadArg { slot }
            | Self::PopArg { slot }
            | Self::PopLocal { slot }
            | Self::PushLocal { slot }
            | Self::RefSlot { slot } => write!(f, "{mnemonic} {slot}"),
            Self::InitLocal { slot, kind } => write!(f, "{mnemonic}.{kind} {slot}"),
            Self::CheckedConvert { kind } | Self::UncheckedConvert { kind } => {
                write!(f, "{mnemonic}.{kind}")
            }
            Self::Call { function } => write!(f, "{mnemonic} {function}"),
        }
    }
}
