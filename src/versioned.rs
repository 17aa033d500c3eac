use std::cell::{Ref, RefCell};
use std::ops;


// A value with a revision counter that is bumped on every mutable access. Data derived from the
// value can be cached together with the revision it was computed for.
#[derive(Clone, Debug)]
pub struct Versioned<T> {
    value: T,
    revision: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self { Self { value, revision: 0 } }

    pub fn get_mut(&mut self) -> &mut T {
        self.revision += 1;
        &mut self.value
    }

    pub fn revision(&self) -> u64 { self.revision }
}

impl<T> ops::Deref for Versioned<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target { &self.value }
}
// Don't implement `DerefMut`. A call to `get_mut` stresses the fact that it bumps the revision.


// Value computed for a revision key and recomputed lazily when the key changes.
#[derive(Clone, Debug)]
pub struct Memo<K, T> {
    cell: RefCell<(K, T)>,
}

impl<K: PartialEq, T> Memo<K, T> {
    pub fn new(key: K, value: T) -> Self { Memo { cell: RefCell::new((key, value)) } }

    pub fn get_or_compute(&self, key: K, compute: impl FnOnce() -> T) -> Ref<'_, T> {
        let stale = self.cell.borrow().0 != key;
        if stale {
            self.cell.replace((key, compute()));
        }
        Ref::map(self.cell.borrow(), |(_, value)| value)
    }
}
