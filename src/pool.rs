use super::*;
use std::cell::RefCell;

/// Steady-state arena size. A chain deeper than this is treated as an
/// outlier: the arena it inflated is dropped once the last guard goes
/// away instead of being kept warm.
pub(crate) const CHAIN_POOL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ItemId(u32);

impl ItemId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

enum Slot {
    Free { next_free: Option<ItemId> },
    Live(ChainItem),
}

#[derive(Default)]
struct PoolState {
    slots: Option<Vec<Slot>>,
    free_head: Option<ItemId>,
    users: u32,
    live: u32,
    high_water: u32,
}

/// Chain-item arena shared by every dispatch that runs through one
/// dispatcher. All state lives on the instance; independent dispatchers
/// never interfere.
#[derive(Clone, Default)]
pub(crate) struct ChainPool {
    state: Rc<RefCell<PoolState>>,
}

impl ChainPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register one live user, creating the arena on first use. Every
    /// top-level or re-entrant dispatch holds one guard for its duration.
    pub(crate) fn acquire(&self) -> Result<PoolGuard> {
        let mut state = self.state.borrow_mut();
        if state.slots.is_none() {
            let mut slots = Vec::new();
            slots
                .try_reserve(CHAIN_POOL_CAPACITY)
                .map_err(|_| Error::OutOfMemory)?;
            state.slots = Some(slots);
        }
        state.users += 1;
        Ok(PoolGuard {
            state: Rc::clone(&self.state),
        })
    }

    /// Drop the cached arena immediately, provided no dispatch is on the
    /// stack. Embedder shutdown hook.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.borrow_mut();
        if state.users == 0 {
            state.slots = None;
            state.free_head = None;
            state.high_water = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn live_items(&self) -> u32 {
        self.state.borrow().live
    }

    #[cfg(test)]
    pub(crate) fn high_water(&self) -> u32 {
        self.state.borrow().high_water
    }

    #[cfg(test)]
    pub(crate) fn users(&self) -> u32 {
        self.state.borrow().users
    }

    #[cfg(test)]
    pub(crate) fn arena_allocated(&self) -> bool {
        self.state.borrow().slots.is_some()
    }
}

pub(crate) struct PoolGuard {
    state: Rc<RefCell<PoolState>>,
}

impl PoolGuard {
    pub(crate) fn alloc(&self, item: ChainItem) -> Result<ItemId> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let slots = state.slots.get_or_insert_with(Vec::new);
        let id = if let Some(id) = state.free_head {
            let slot = &mut slots[id.index()];
            state.free_head = match slot {
                Slot::Free { next_free } => *next_free,
                Slot::Live(_) => None,
            };
            *slot = Slot::Live(item);
            id
        } else {
            if slots.len() == slots.capacity() {
                slots.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
            }
            let id = ItemId(slots.len() as u32);
            slots.push(Slot::Live(item));
            id
        };
        state.live += 1;
        if state.live > state.high_water {
            state.high_water = state.live;
        }
        Ok(id)
    }

    pub(crate) fn free(&self, id: ItemId) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        if let Some(slots) = state.slots.as_mut() {
            slots[id.index()] = Slot::Free {
                next_free: state.free_head,
            };
            state.free_head = Some(id);
            state.live -= 1;
        }
    }

    // Item access stays scoped to one short borrow so handlers invoked
    // between accesses can re-enter the pool.
    pub(crate) fn with_item<R>(&self, id: ItemId, read: impl FnOnce(&ChainItem) -> R) -> R {
        let state = self.state.borrow();
        match state.slots.as_deref().map(|slots| &slots[id.index()]) {
            Some(Slot::Live(item)) => read(item),
            _ => unreachable!("chain item {} is not live", id.0),
        }
    }

    pub(crate) fn with_item_mut<R>(
        &self,
        id: ItemId,
        write: impl FnOnce(&mut ChainItem) -> R,
    ) -> R {
        let mut state = self.state.borrow_mut();
        match state
            .slots
            .as_deref_mut()
            .map(|slots| &mut slots[id.index()])
        {
            Some(Slot::Live(item)) => write(item),
            _ => unreachable!("chain item {} is not live", id.0),
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.users -= 1;
        if state.users == 0 && state.high_water as usize > CHAIN_POOL_CAPACITY {
            state.slots = None;
            state.free_head = None;
            state.high_water = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    struct StubTarget;

    impl EventTarget for StubTarget {
        fn target_id(&self) -> TargetId {
            TargetId(0)
        }

        fn pre_handle(&self, _visitor: &mut PreVisitor<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn stub_item() -> ChainItem {
        ChainItem::new(Rc::new(StubTarget) as Rc<dyn EventTarget>)
    }

    #[test]
    fn arena_is_created_lazily_and_survives_normal_use() -> Result<()> {
        let pool = ChainPool::new();
        assert!(!pool.arena_allocated());

        let guard = pool.acquire()?;
        assert!(pool.arena_allocated());
        let a = guard.alloc(stub_item())?;
        let b = guard.alloc(stub_item())?;
        assert_eq!(pool.live_items(), 2);
        guard.free(b);
        guard.free(a);
        assert_eq!(pool.live_items(), 0);
        drop(guard);

        // Shallow use keeps the arena warm for the next dispatch.
        assert!(pool.arena_allocated());
        assert_eq!(pool.high_water(), 2);
        Ok(())
    }

    #[test]
    fn free_list_reuses_slots_most_recently_freed_first() -> Result<()> {
        let pool = ChainPool::new();
        let guard = pool.acquire()?;
        let a = guard.alloc(stub_item())?;
        let b = guard.alloc(stub_item())?;
        guard.free(a);
        guard.free(b);
        let c = guard.alloc(stub_item())?;
        let d = guard.alloc(stub_item())?;
        assert_eq!(c, b);
        assert_eq!(d, a);
        Ok(())
    }

    #[test]
    fn deep_chain_tears_the_arena_down_on_last_release() -> Result<()> {
        let pool = ChainPool::new();
        let guard = pool.acquire()?;
        let mut ids = Vec::new();
        for _ in 0..CHAIN_POOL_CAPACITY + 1 {
            ids.push(guard.alloc(stub_item())?);
        }
        for id in ids {
            guard.free(id);
        }
        assert!(pool.arena_allocated());
        drop(guard);

        assert!(!pool.arena_allocated());
        assert_eq!(pool.high_water(), 0);
        Ok(())
    }

    #[test]
    fn nested_guard_defers_teardown_to_the_outermost_release() -> Result<()> {
        let pool = ChainPool::new();
        let outer = pool.acquire()?;
        let mut ids = Vec::new();
        for _ in 0..CHAIN_POOL_CAPACITY + 1 {
            ids.push(outer.alloc(stub_item())?);
        }
        for id in ids.drain(..) {
            outer.free(id);
        }

        let inner = pool.acquire()?;
        drop(inner);
        // The deep chain already happened, but a user is still live.
        assert!(pool.arena_allocated());
        drop(outer);
        assert!(!pool.arena_allocated());
        Ok(())
    }

    #[test]
    fn shutdown_is_a_no_op_while_a_guard_is_live() -> Result<()> {
        let pool = ChainPool::new();
        let guard = pool.acquire()?;
        pool.shutdown();
        assert!(pool.arena_allocated());
        drop(guard);
        pool.shutdown();
        assert!(!pool.arena_allocated());
        Ok(())
    }

    proptest! {
        #[test]
        fn alloc_free_batches_keep_counters_consistent(
            batches in vec(1usize..32, 1..16),
        ) {
            let pool = ChainPool::new();
            let guard = pool.acquire().unwrap();
            let mut deepest = 0;
            for batch in &batches {
                let ids: Vec<_> = (0..*batch)
                    .map(|_| guard.alloc(stub_item()).unwrap())
                    .collect();
                deepest = deepest.max(*batch);
                prop_assert_eq!(pool.live_items() as usize, *batch);
                for id in ids {
                    guard.free(id);
                }
                prop_assert_eq!(pool.live_items(), 0);
            }
            prop_assert_eq!(pool.high_water() as usize, deepest);
        }
    }
}
