use super::core::Coroutine;
use crate::utils::Slab;

/// Tagged reference to a coroutine slot.
///
/// A handle is only honoured while the slot still holds the same
/// coroutine at the same resume generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CoroHandle {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// Owner of every non-main coroutine of one runner.
///
/// Coroutines are boxed so their address (and therefore their saved
/// context) stays put while the slab grows. Each slot remembers the last
/// generation it reached, and a new occupant starts past it, so a handle
/// to a destroyed coroutine never matches its replacement.
pub(crate) struct Arena {
    slots: Slab<Box<Coroutine>>,
    epochs: Vec<u64>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::new(8),
            epochs: Vec::new(),
        }
    }

    /// Creates a coroutine in a free slot and returns its index.
    pub(crate) fn spawn(&mut self, entry: extern "C" fn(), stack_size: usize) -> usize {
        let index = self.slots.next_index();

        if self.epochs.len() <= index {
            self.epochs.resize(index + 1, 0);
        }

        let generation = self.epochs[index] + 1;
        let inserted = self
            .slots
            .insert(Box::new(Coroutine::new(entry, stack_size, generation)));
        debug_assert_eq!(inserted, index);

        inserted
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Coroutine> {
        self.slots.get(index).map(|coroutine| &**coroutine)
    }

    /// Raw pointer to a slot's coroutine, stable until the slot is removed.
    pub(crate) fn ptr(&self, index: usize) -> Option<*const Coroutine> {
        self.get(index).map(|coroutine| coroutine as *const Coroutine)
    }

    /// Resolves a handle, rejecting stale ones.
    pub(crate) fn resolve(&self, handle: CoroHandle) -> Option<&Coroutine> {
        self.get(handle.index)
            .filter(|coroutine| coroutine.generation() == handle.generation)
    }

    pub(crate) fn handle(&self, index: usize) -> Option<CoroHandle> {
        self.get(index).map(|coroutine| CoroHandle {
            index,
            generation: coroutine.generation(),
        })
    }

    /// Takes a coroutine out of the arena. The box must not be dropped
    /// while its stack is executing.
    pub(crate) fn remove(&mut self, index: usize) -> Option<Box<Coroutine>> {
        let coroutine = self.slots.remove(index)?;
        self.epochs[index] = coroutine.generation();

        Some(coroutine)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Removes every coroutine, for runner teardown.
    pub(crate) fn drain(&mut self) -> Vec<Box<Coroutine>> {
        self.slots.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn never_started() {}

    #[test]
    fn replacement_coroutines_outrun_old_handles() {
        let mut arena = Arena::new();

        let index = arena.spawn(never_started, 16 * 1024);
        let old = arena.handle(index).unwrap();
        assert!(arena.resolve(old).is_some());

        arena.get(index).unwrap().bump_generation();
        assert!(arena.resolve(old).is_none());

        arena.remove(index).unwrap();
        let reused = arena.spawn(never_started, 16 * 1024);
        assert_eq!(reused, index);

        let fresh = arena.handle(reused).unwrap();
        assert!(fresh.generation > old.generation + 1);
        assert!(arena.resolve(old).is_none());
        assert_eq!(arena.len(), 1);
    }
}
