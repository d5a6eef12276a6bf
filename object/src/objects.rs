use bytecode::Kind;
use thiserror::Error;

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("element {index} is {found}, object holds {expected}")]
pub struct ElementKindMismatch {
    /// Payload position (0-based, not counting the length header).
    pub index: usize,
    pub expected: Kind,
    pub found: Kind,
}

/// An array of values with a fixed element kind.
///
/// Element 0 reads as the `usize_t` length header; elements `1..=len` are
/// the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    element: Kind,
    payload: Vec<Value>,
}

impl HeapObject {
    pub fn new(element: Kind, payload: Vec<Value>) -> Result<Self, ElementKindMismatch> {
        if let Some((index, value)) = payload
            .iter()
            .enumerate()
            .find(|(_, value)| value.kind() != element)
        {
            return Err(ElementKindMismatch {
                index,
                expected: element,
                found: value.kind(),
            });
        }
        Ok(Self { element, payload })
    }

    /// A `u8` array holding `bytes`.
    pub fn bytes(bytes: &[u8]) -> Self {
        Self {
            element: Kind::U8,
            payload: bytes.iter().copied().map(Value::U8).collect(),
        }
    }

    #[inline]
    pub fn element(&self) -> Kind {
        self.element
    }

    /// Payload length, i.e. the value of the length header.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    /// Element `index`, where 0 is the length header.
    pub fn get(&self, index: usize) -> Option<Value> {
        match index {
            0 => Some(Value::Usize(self.payload.len() as u64)),
            _ => self.payload.get(index - 1).copied(),
        }
    }
}
