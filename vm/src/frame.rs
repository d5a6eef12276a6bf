use bytecode::Kind;
use object::Value;

use crate::{OperandStack, TrapKind};

/// Read-only argument slots, filled once at call entry. `poparg` drains a
/// slot, after which it can no longer be read.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentBank {
    values: Vec<Value>,
    consumed: Vec<bool>,
}

impl ArgumentBank {
    pub fn new(values: Vec<Value>) -> Self {
        let consumed = vec![false; values.len()];
        Self { values, consumed }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed.get(index).copied().unwrap_or(false)
    }

    /// Copy of slot `index`.
    pub fn read(&self, index: usize) -> Result<Value, TrapKind> {
        let value = self.values.get(index).ok_or(TrapKind::InvalidSlot)?;
        if self.consumed[index] {
            return Err(TrapKind::SlotAlreadyConsumed);
        }
        Ok(*value)
    }

    /// Moves slot `index` out and marks it consumed.
    pub fn take(&mut self, index: usize) -> Result<Value, TrapKind> {
        let value = self.read(index)?;
        self.consumed[index] = true;
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalSlot {
    Uninit,
    /// Declared but never written; reads as the kind's zero.
    Declared(Kind),
    Holding(Value),
}

impl LocalSlot {
    pub fn kind(&self) -> Option<Kind> {
        match self {
            LocalSlot::Uninit => None,
            LocalSlot::Declared(kind) => Some(*kind),
            LocalSlot::Holding(value) => Some(value.kind()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalBank {
    slots: Vec<LocalSlot>,
}

impl LocalBank {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![LocalSlot::Uninit; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&LocalSlot> {
        self.slots.get(index)
    }

    /// Declares slot `index` with `kind`, dropping whatever it held.
    pub fn init(&mut self, index: usize, kind: Kind) -> Result<(), TrapKind> {
        let slot = self.slots.get_mut(index).ok_or(TrapKind::InvalidSlot)?;
        *slot = LocalSlot::Declared(kind);
        Ok(())
    }

    /// Checks that a value of `kind` may be written to slot `index`.
    pub fn check_write(&self, index: usize, kind: Kind) -> Result<(), TrapKind> {
        let slot = self.slots.get(index).ok_or(TrapKind::InvalidSlot)?;
        match slot.kind() {
            Some(declared) if declared != kind => Err(TrapKind::StackTypeMismatch),
            _ => Ok(()),
        }
    }

    /// Stores `value`. A never-declared slot takes on the value's kind.
    pub fn write(&mut self, index: usize, value: Value) -> Result<(), TrapKind> {
        self.check_write(index, value.kind())?;
        self.slots[index] = LocalSlot::Holding(value);
        Ok(())
    }

    pub fn read(&self, index: usize) -> Result<Value, TrapKind> {
        match self.slots.get(index).ok_or(TrapKind::InvalidSlot)? {
            LocalSlot::Uninit => Err(TrapKind::UninitializedRead),
            LocalSlot::Declared(kind) => Value::zero(*kind).ok_or(TrapKind::UninitializedRead),
            LocalSlot::Holding(value) => Ok(*value),
        }
    }
}

/// One activation of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: u16,
    /// Offset of the next instruction in the function's code.
    pub pc: usize,
    pub args: ArgumentBank,
    pub locals: LocalBank,
    pub stack: OperandStack,
}

impl Frame {
    pub fn new(function: u16, args: Vec<Value>, locals: usize, stack_limit: usize) -> Self {
        Self {
            function,
            pc: 0,
            args: ArgumentBank::new(args),
            locals: LocalBank::new(locals),
            stack: OperandStack::new(stack_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::Address;

    #[test]
    fn read_copies_take_consumes() {
        let mut args = ArgumentBank::new(vec![Value::I32(5), Value::Bool(true)]);
        assert_eq!(args.read(0), Ok(Value::I32(5)));
        assert_eq!(args.read(0), Ok(Value::I32(5)));
        assert_eq!(args.take(1), Ok(Value::Bool(true)));
        assert!(args.is_consumed(1));
        assert_eq!(args.take(1), Err(TrapKind::SlotAlreadyConsumed));
        assert_eq!(args.read(1), Err(TrapKind::SlotAlreadyConsumed));
        assert_eq!(args.read(2), Err(TrapKind::InvalidSlot));
    }

    #[test]
    fn locals_lifecycle() {
        let mut locals = LocalBank::new(2);
        assert_eq!(locals.read(0), Err(TrapKind::UninitializedRead));
        locals.init(0, Kind::I32).unwrap();
        assert_eq!(locals.read(0), Ok(Value::I32(0)));
        locals.write(0, Value::I32(9)).unwrap();
        assert_eq!(locals.read(0), Ok(Value::I32(9)));
        assert_eq!(locals.write(0, Value::U8(1)), Err(TrapKind::StackTypeMismatch));

        // Re-declaring resets the slot.
        locals.init(0, Kind::F32).unwrap();
        assert_eq!(locals.read(0), Ok(Value::F32(0.0)));

        assert_eq!(locals.init(2, Kind::U8), Err(TrapKind::InvalidSlot));
        assert_eq!(locals.read(2), Err(TrapKind::InvalidSlot));
    }

    #[test]
    fn write_declares_fresh_slot() {
        let mut locals = LocalBank::new(1);
        locals.write(0, Value::U64(3)).unwrap();
        assert_eq!(locals.slot(0).and_then(LocalSlot::kind), Some(Kind::U64));
        assert_eq!(locals.write(0, Value::I64(3)), Err(TrapKind::StackTypeMismatch));
    }

    #[test]
    fn declared_ref_has_no_zero() {
        let mut locals = LocalBank::new(1);
        locals.init(0, Kind::Ref).unwrap();
        assert_eq!(locals.read(0), Err(TrapKind::UninitializedRead));
        let reference = Value::reference(Address::new(1, 0), Kind::U8);
        locals.write(0, reference).unwrap();
        assert_eq!(locals.read(0), Ok(reference));
    }
}
