use crate::{Instruction, Kind, Op};

/// Builds a bytecode byte sequence.
///
/// The builder automatically emits the [`Op::Wide`] prefix when a slot
/// operand exceeds `u8::MAX`.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    buf: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    fn emit_kind(&mut self, kind: Kind) {
        self.buf.push(kind as u8);
    }

    fn needs_wide(slot: u16) -> bool {
        slot > u8::MAX as u16
    }

    /// Emits `[Wide] op` and returns whether the slot is wide.
    fn emit_slot_op(&mut self, op: Op, slot: u16) -> bool {
        let wide = Self::needs_wide(slot);
        if wide {
            self.emit_op(Op::Wide);
        }
        self.emit_op(op);
        wide
    }

    fn emit_slot(&mut self, slot: u16, wide: bool) {
        if wide {
            self.emit_u16(slot);
        } else {
            self.emit_u8(slot as u8);
        }
    }

    fn slot_instruction(&mut self, op: Op, slot: u16) {
        let wide = self.emit_slot_op(op, slot);
        self.emit_slot(slot, wide);
    }

    /// Encode any decoded instruction.
    pub fn emit(&mut self, instruction: Instruction) {
        match instruction {
            Instruction::Nop => self.nop(),
            Instruction::PushU8 { value } => self.push_u8(value),
            Instruction::LoadArg { slot } => self.load_arg(slot),
            Instruction::PopArg { slot } => self.pop_arg(slot),
            Instruction::InitLocal { slot, kind } => self.init_local(slot, kind),
            Instruction::PopLocal { slot } => self.pop_local(slot),
            Instruction::PushLocal { slot } => self.push_local(slot),
            Instruction::RefSlot { slot } => self.ref_slot(slot),
            Instruction::PushArray => self.push_array(),
            Instruction::CheckedConvert { kind } => self.checked_convert(kind),
            Instruction::UncheckedConvert { kind } => self.unchecked_convert(kind),
            Instruction::Call { function } => self.call(function),
            Instruction::Ret => self.ret(),
        }
    }

    /// `nop`
    pub fn nop(&mut self) {
        self.emit_op(Op::Nop);
    }

    /// `push.u8 <value:u8>`
    pub fn push_u8(&mut self, value: u8) {
        self.emit_op(Op::PushU8);
        self.emit_u8(value);
    }

    /// `loadarg <slot>`: copy an argument onto the stack.
    pub fn load_arg(&mut self, slot: u16) {
        self.slot_instruction(Op::LoadArg, slot);
    }

    /// `poparg <slot>`: move an argument onto the stack.
    pub fn pop_arg(&mut self, slot: u16) {
        self.slot_instruction(Op::PopArg, slot);
    }

    /// `initlocal.<kind> <slot>`: encoded as `InitLocal <kind:u8> <slot>`.
    pub fn init_local(&mut self, slot: u16, kind: Kind) {
        let wide = self.emit_slot_op(Op::InitLocal, slot);
        self.emit_kind(kind);
        self.emit_slot(slot, wide);
    }

    /// `poplocal <slot>`
    pub fn pop_local(&mut self, slot: u16) {
        self.slot_instruction(Op::PopLocal, slot);
    }

    /// `pushlocal <slot>`
    pub fn push_local(&mut self, slot: u16) {
        self.slot_instruction(Op::PushLocal, slot);
    }

    /// `refslot <slot>`: read through the reference on the stack top.
    pub fn ref_slot(&mut self, slot: u16) {
        self.slot_instruction(Op::RefSlot, slot);
    }

    /// `pusharray`
    pub fn push_array(&mut self) {
        self.emit_op(Op::PushArray);
    }

    /// `cconv.<kind>`
    pub fn checked_convert(&mut self, kind: Kind) {
        self.emit_op(Op::CheckedConvert);
        self.emit_kind(kind);
    }

    /// `uconv.<kind>`
    pub fn unchecked_convert(&mut self, kind: Kind) {
        self.emit_op(Op::UncheckedConvert);
        self.emit_kind(kind);
    }

    /// `call <function:u16>`
    pub fn call(&mut self, function: u16) {
        self.emit_op(Op::Call);
        self.emit_u16(function);
    }

    /// `ret`
    pub fn ret(&mut self) {
        self.emit_op(Op::Ret);
    }
}
