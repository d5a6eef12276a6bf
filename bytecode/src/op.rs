/// Bytecode opcodes.
///
/// Slot operands are 8-bit by default. The [`Wide`](Op::Wide) prefix
/// promotes slot operands to 16-bit. Function indices are always 16-bit and
/// kind operands are always a single tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Prefix: the next instruction uses a 16-bit slot operand.
    Wide = 0x00,

    /// No effect.
    Nop,

    /// Push a `u8` literal.
    /// Operands: `value:u8`
    PushU8,

    /// Copy an argument onto the stack.
    /// Operands: `slot:u8` (wide: `u16`)
    LoadArg,

    /// Move an argument onto the stack, draining its slot.
    /// Operands: `slot:u8` (wide: `u16`)
    PopArg,

    /// Declare a local slot with a kind.
    /// Operands: `kind:u8`, `slot:u8` (wide: `u16`)
    InitLocal,

    /// Pop the stack top into a local slot.
    /// Operands: `slot:u8` (wide: `u16`)
    PopLocal,

    /// Copy a local slot onto the stack.
    /// Operands: `slot:u8` (wide: `u16`)
    PushLocal,

    /// Pop a reference and push the referenced object's element `slot`.
    /// Operands: `slot:u8` (wide: `u16`)
    RefSlot,

    /// Pop an integer index, pop a reference, push payload element `index`.
    PushArray,

    /// Convert the stack top, trapping when the value does not fit.
    /// Operands: `kind:u8`
    CheckedConvert,

    /// Convert the stack top by truncation/reinterpretation.
    /// Operands: `kind:u8`
    UncheckedConvert,

    /// Call a function of the program.
    /// Operands: `function:u16`
    Call,

    /// Return from the current frame.
    Ret,
}

impl Op {
    pub const COUNT: usize = 14;

    const ALL: [Op; Self::COUNT] = [
        Op::Wide,
        Op::Nop,
        Op::PushU8,
        Op::LoadArg,
        Op::PopArg,
        Op::InitLocal,
        Op::PopLocal,
        Op::PushLocal,
        Op::RefSlot,
        Op::PushArray,
        Op::CheckedConvert,
        Op::UncheckedConvert,
        Op::Call,
        Op::Ret,
    ];

    /// Whether this opcode has a slot operand that [`Op::Wide`] can widen.
    pub fn accepts_wide(self) -> bool {
        matches!(
            self,
            Op::LoadArg
                | Op::PopArg
                | Op::InitLocal
                | Op::PopLocal
                | Op::PushLocal
                | Op::RefSlot
        )
    }

    /// Assembly mnemonic. Conversions and `initlocal` take a `.<kind>` suffix.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Wide => "wide",
            Op::Nop => "nop",
            Op::PushU8 => "push.u8",
            Op::LoadArg => "loadarg",
            Op::PopArg => "poparg",
            Op::InitLocal => "initlocal",
            Op::PopLocal => "poplocal",
            Op::PushLocal => "pushlocal",
            Op::RefSlot => "refslot",
            Op::PushArray => "pusharray",
            Op::CheckedConvert => "cconv",
            Op::UncheckedConvert => "uconv",
            Op::Call => "call",
            Op::Ret => "ret",
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::ALL.get(byte as usize).copied().ok_or(byte)
    }
}
