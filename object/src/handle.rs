use core::fmt;

use bytecode::Kind;

/// Opaque heap address: an arena index checked against the generation the
/// slot had when the object was created.
///
/// Equality is identity. Once an object is released its address never
/// resolves again, even if the arena slot is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    index: u32,
    generation: u32,
}

impl Address {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:x}", self.index)?;
        if self.generation != 0 {
            write!(f, "'{}", self.generation)?;
        }
        Ok(())
    }
}

/// The payload of a `ref<T>` value: where the object lives and the static
/// element kind `T` of the object it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    pub address: Address,
    pub element: Kind,
}

impl Reference {
    #[inline]
    pub const fn new(address: Address, element: Kind) -> Self {
        Self { address, element }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref<{}> {}", self.element, self.address)
    }
}
