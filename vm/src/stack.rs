use object::{Reference, Value};

use crate::TrapKind;

/// Per-frame LIFO of values with a fixed upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandStack {
    values: Vec<Value>,
    limit: usize,
}

impl OperandStack {
    pub fn new(limit: usize) -> Self {
        Self {
            values: Vec::new(),
            limit,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Live values, bottom first.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Fails unless at least `n` values are present.
    pub fn require(&self, n: usize) -> Result<(), TrapKind> {
        if self.values.len() < n {
            return Err(TrapKind::StackUnderflow);
        }
        Ok(())
    }

    /// Fails unless `n` more values fit under the limit.
    pub fn ensure_room(&self, n: usize) -> Result<(), TrapKind> {
        match self.values.len().checked_add(n) {
            Some(depth) if depth <= self.limit => Ok(()),
            _ => Err(TrapKind::StackOverflow),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), TrapKind> {
        self.ensure_room(1)?;
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, TrapKind> {
        self.values.pop().ok_or(TrapKind::StackUnderflow)
    }

    pub fn peek(&self) -> Result<Value, TrapKind> {
        self.peek_nth(0)
    }

    /// The value `n` places below the top (0 is the top).
    pub fn peek_nth(&self, n: usize) -> Result<Value, TrapKind> {
        self.values
            .len()
            .checked_sub(n + 1)
            .map(|idx| self.values[idx])
            .ok_or(TrapKind::StackUnderflow)
    }

    pub fn replace_top(&mut self, value: Value) -> Result<Value, TrapKind> {
        let top = self.values.last_mut().ok_or(TrapKind::StackUnderflow)?;
        Ok(core::mem::replace(top, value))
    }

    /// Removes the top `n` values, returned bottom first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, TrapKind> {
        self.require(n)?;
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    /// Appends `values` (bottom first) as one unit; nothing is pushed if they
    /// do not all fit.
    pub fn extend(&mut self, values: Vec<Value>) -> Result<(), TrapKind> {
        self.ensure_room(values.len())?;
        self.values.extend(values);
        Ok(())
    }

    /// The `ref<T>` `n` places below the top, left in place.
    pub fn peek_ref(&self, n: usize) -> Result<Reference, TrapKind> {
        self.peek_nth(n)?
            .as_reference()
            .ok_or(TrapKind::StackTypeMismatch)
    }
}
