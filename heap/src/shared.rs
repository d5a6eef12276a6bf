use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::HeapStore;

/// A heap store shared between several VM instances.
///
/// The interpreter borrows a `&mut HeapStore` for a whole invocation; hosts
/// holding a `SharedHeap` take the lock for that duration, which keeps at
/// most one dispatcher mutating the store at a time.
#[derive(Debug, Clone, Default)]
pub struct SharedHeap {
    inner: Arc<Mutex<HeapStore>>,
}

impl SharedHeap {
    pub fn new(store: HeapStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, HeapStore> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, HeapStore>> {
        self.inner.try_lock()
    }
}

impl From<HeapStore> for SharedHeap {
    fn from(store: HeapStore) -> Self {
        Self::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_one_store() {
        let shared = SharedHeap::default();
        let other = shared.clone();
        let address = shared.lock().create_bytes(b"abc").unwrap();
        assert!(other.lock().is_live(address));
    }

    #[test]
    fn lock_is_exclusive() {
        let shared = SharedHeap::default();
        let guard = shared.lock();
        assert!(shared.try_lock().is_none());
        drop(guard);
        assert!(shared.try_lock().is_some());
    }

    #[test]
    fn threads_serialize_on_the_store() {
        let shared = SharedHeap::default();
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        shared.lock().create_bytes(&[n]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.lock().len(), 100);
    }
}
