use bytecode::Kind;
use object::{Address, ElementKindMismatch, HeapObject, Value};
use thiserror::Error;

/// What happens to an arena slot once its object is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    /// Released slots stay tombstoned for the lifetime of the store.
    #[default]
    Retain,
    /// Released slots are reused under a new generation, so addresses that
    /// named the old object stay dangling.
    Recycle,
}

#[derive(Debug, Clone, Default)]
pub struct HeapCreateInfo {
    pub policy: ReclaimPolicy,
    /// Number of objects to reserve room for up front.
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("dangling reference {0}")]
    DanglingReference(Address),
    #[error("index {index} out of range for {address} (length {length})")]
    IndexOutOfRange {
        address: Address,
        index: usize,
        length: usize,
    },
    #[error(transparent)]
    ElementKind(#[from] ElementKindMismatch),
    #[error("heap address space exhausted")]
    Exhausted,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    object: Option<HeapObject>,
}

/// The table of addressable heap objects.
///
/// Objects are never moved or reclaimed behind the host's back: an address
/// stays valid until [`HeapStore::release`] is called on it, and is never
/// handed out again afterwards.
#[derive(Debug)]
pub struct HeapStore {
    entries: Vec<Entry>,
    free: Vec<u32>,
    policy: ReclaimPolicy,
    live: usize,
}

impl Default for HeapStore {
    fn default() -> Self {
        Self::new(HeapCreateInfo::default())
    }
}

impl HeapStore {
    pub fn new(info: HeapCreateInfo) -> Self {
        Self {
            entries: Vec::with_capacity(info.capacity),
            free: Vec::new(),
            policy: info.policy,
            live: 0,
        }
    }

    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocate an object of `kind` elements and return its address.
    pub fn create(&mut self, kind: Kind, elements: Vec<Value>) -> Result<Address, HeapError> {
        let object = HeapObject::new(kind, elements)?;
        self.insert(object)
    }

    /// Allocate a `u8` array.
    pub fn create_bytes(&mut self, bytes: &[u8]) -> Result<Address, HeapError> {
        self.insert(HeapObject::bytes(bytes))
    }

    pub fn insert(&mut self, object: HeapObject) -> Result<Address, HeapError> {
        let kind = object.element();
        let len = object.len();

        let address = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.object = Some(object);
                Address::new(index, entry.generation)
            }
            None => {
                let index = u32::try_from(self.entries.len()).map_err(|_| HeapError::Exhausted)?;
                self.entries.push(Entry {
                    generation: 0,
                    object: Some(object),
                });
                Address::new(index, 0)
            }
        };

        self.live += 1;
        log::trace!("heap: created {address} {kind}[{len}]");
        Ok(address)
    }

    pub fn is_live(&self, address: Address) -> bool {
        self.object(address).is_ok()
    }

    pub fn object(&self, address: Address) -> Result<&HeapObject, HeapError> {
        self.entries
            .get(address.index() as usize)
            .filter(|entry| entry.generation == address.generation())
            .and_then(|entry| entry.object.as_ref())
            .ok_or(HeapError::DanglingReference(address))
    }

    /// A `ref<T>` value naming the object at `address`, where `T` is the
    /// object's element kind.
    pub fn reference(&self, address: Address) -> Result<Value, HeapError> {
        let object = self.object(address)?;
        Ok(Value::reference(address, object.element()))
    }

    /// Element `index` of the object at `address`; index 0 is the length
    /// header.
    pub fn deref(&self, address: Address, index: usize) -> Result<Value, HeapError> {
        let object = self.object(address)?;
        object.get(index).ok_or(HeapError::IndexOutOfRange {
            address,
            index,
            length: object.len(),
        })
    }

    /// Invalidate `address` and hand the object back to the host. Every
    /// reference to it is dangling from here on.
    pub fn release(&mut self, address: Address) -> Result<HeapObject, HeapError> {
        self.object(address)?;
        let entry = &mut self.entries[address.index() as usize];
        let object = entry.object.take().ok_or(HeapError::DanglingReference(address))?;

        self.live -= 1;
        // A slot that runs out of generations is retired for good.
        if let Some(next) = entry.generation.checked_add(1) {
            entry.generation = next;
            if self.policy == ReclaimPolicy::Recycle {
                self.free.push(address.index());
            }
        }

        log::trace!("heap: released {address}");
        Ok(object)
    }
}
