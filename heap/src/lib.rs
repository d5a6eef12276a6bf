mod heap;
mod shared;

pub use heap::{HeapCreateInfo, HeapError, HeapStore, ReclaimPolicy};
pub use shared::SharedHeap;
