use std::mem::MaybeUninit;

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and
/// returns stable indices that can be reused after removal.
///
/// The reactor uses it to map poller tokens back to watched descriptors,
/// and the coroutine arena uses it to hand out coroutine slots.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free indices,
/// - and uninitialized memory using [`MaybeUninit`].
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
    /// Number of initialized slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free and uninitialized. Free indices are
    /// handed out lowest first.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        let free = (0..size).rev().collect();
        let used = (0..size).map(|_| false).collect();

        Self {
            items,
            free,
            used,
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend(((len + 1)..new_len).rev());
            self.used.extend((len..new_len).map(|_| false));

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;
        self.len += 1;

        index
    }

    /// Index the next [`insert`](Self::insert) will return.
    pub(crate) fn next_index(&self) -> usize {
        self.free.last().copied().unwrap_or(self.items.len())
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// Returns `None` when the slot is out of range or vacant, so stale
    /// indices are harmless.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        if !self.contains(index) {
            return None;
        }

        self.free.push(index);
        self.used[index] = false;
        self.len -= 1;

        let item = unsafe { self.items[index].assume_init_read() };
        self.items[index] = MaybeUninit::uninit();

        Some(item)
    }

    /// Returns `true` if `index` refers to an initialized slot.
    fn contains(&self, index: usize) -> bool {
        self.used.get(index).copied().unwrap_or(false)
    }

    /// Returns a shared reference to the value at `index`, if any.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if !self.contains(index) {
            return None;
        }

        // The `used` flag guarantees the slot was initialized by `insert`.
        Some(unsafe { self.items[index].assume_init_ref() })
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Removes every value, returning them in index order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let indices: Vec<usize> = (0..self.items.len()).filter(|&i| self.used[i]).collect();

        indices
            .into_iter()
            .filter_map(|index| self.remove(index))
            .collect()
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    ///
    /// Uninitialized slots are ignored.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn reuses_freed_indices() {
        let mut slab = Slab::new(2);
        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!((a, b), (0, 1));

        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.insert("c"), a);
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::new(1);
        let indices: Vec<usize> = (0..10).map(|i| slab.insert(i)).collect();

        assert_eq!(slab.len(), 10);
        for (value, index) in indices.iter().enumerate() {
            assert_eq!(slab.get(*index), Some(&value));
        }
    }

    #[test]
    fn stale_index_is_harmless() {
        let mut slab = Slab::new(4);
        let index = slab.insert(7u32);

        assert_eq!(slab.remove(index), Some(7));
        assert_eq!(slab.remove(index), None);
        assert!(slab.get(index).is_none());
        assert!(slab.get(42).is_none());
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = Slab::new(4);
        slab.insert(1);
        let middle = slab.insert(2);
        slab.insert(3);
        slab.remove(middle);

        assert_eq!(slab.drain(), vec![1, 3]);
        assert_eq!(slab.len(), 0);
    }
}
