//! Hand-off of dirty roots from the event loop to the dispatcher.
//!
//! The event loop accumulates a local [`DirtySet`] per read cycle and merges
//! it into the shared [`DirtyQueue`]; the dispatcher drains the queue whole.
//! Access to the queue is serialized by an [`ExclusionFlag`] that moves
//! `Idle -> Enqueueing | Processing -> Idle` through compare-and-exchange.
//! A thread that loses the race yields and retries instead of blocking.
//!
//! The critical section is memory work only: no I/O, no logging, no sleeping,
//! and no allocation once the queue has been sized for the root count.

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use parking_lot::Mutex;

use super::RootId;

/// Distinct root ids. Insertion is idempotent.
///
/// Backed by a `Vec` since the population is bounded by the number of
/// configured roots, which is small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    ids: Vec<RootId>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Insert an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: RootId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn contains(&self, id: RootId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = RootId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Empty the set, keeping its allocation.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl FromIterator<RootId> for DirtySet {
    fn from_iter<T: IntoIterator<Item = RootId>>(iter: T) -> Self {
        let mut set = DirtySet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl IntoIterator for DirtySet {
    type Item = RootId;
    type IntoIter = std::vec::IntoIter<RootId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

/// Logical owner of the queue at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Enqueueing = 1,
    Processing = 2,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Enqueueing,
            2 => Phase::Processing,
            _ => Phase::Idle,
        }
    }
}

/// Three-phase exclusion flag guarding the shared queue.
#[derive(Debug)]
pub struct ExclusionFlag {
    state: AtomicU8,
}

impl ExclusionFlag {
    const STATE_IDLE: u8 = Phase::Idle as u8;

    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Self::STATE_IDLE),
        }
    }

    /// Current phase. Only meaningful as a snapshot.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempt a single `Idle -> phase` transition.
    pub fn try_acquire(&self, phase: Phase) -> Option<FlagGuard<'_>> {
        debug_assert_ne!(phase, Phase::Idle);
        self.state
            .compare_exchange(
                Self::STATE_IDLE,
                phase as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| FlagGuard { flag: self })
    }

    /// Transition `Idle -> phase`, yielding the processor between attempts.
    ///
    /// No fairness: under sustained contention either side may win repeatedly.
    pub fn acquire(&self, phase: Phase) -> FlagGuard<'_> {
        loop {
            if let Some(guard) = self.try_acquire(phase) {
                return guard;
            }
            thread::yield_now();
        }
    }
}

impl Default for ExclusionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Held phase of an [`ExclusionFlag`]; dropping it returns the flag to idle.
#[derive(Debug)]
pub struct FlagGuard<'a> {
    flag: &'a ExclusionFlag,
}

impl FlagGuard<'_> {
    pub fn phase(&self) -> Phase {
        self.flag.phase()
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag
            .state
            .store(ExclusionFlag::STATE_IDLE, Ordering::Release);
    }
}

/// Shared queue of roots awaiting re-indexing.
///
/// The mutex is only ever locked while the flag is held, so it is never
/// contended; it exists to hand out `&mut` access to the contents.
#[derive(Debug)]
pub struct DirtyQueue {
    flag: ExclusionFlag,
    ids: Mutex<DirtySet>,
    capacity: usize,
}

impl DirtyQueue {
    /// Create a queue sized for `capacity` distinct roots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flag: ExclusionFlag::new(),
            ids: Mutex::new(DirtySet::with_capacity(capacity)),
            capacity,
        }
    }

    /// Add every id in `dirty`, ignoring ids already queued.
    pub fn merge(&self, dirty: &DirtySet) {
        let _held = self.flag.acquire(Phase::Enqueueing);
        let mut ids = self.ids.lock();
        for id in dirty.iter() {
            ids.insert(id);
        }
    }

    /// Take everything queued so far and leave the queue empty.
    pub fn drain(&self) -> DirtySet {
        // Allocate the replacement before entering the critical section.
        let fresh = DirtySet::with_capacity(self.capacity);
        let _held = self.flag.acquire(Phase::Processing);
        let mut ids = self.ids.lock();
        let batch = std::mem::replace(&mut *ids, fresh);
        drop(ids);
        batch
    }

    /// Snapshot of the flag, for diagnostics.
    pub fn phase(&self) -> Phase {
        self.flag.phase()
    }

    #[cfg(test)]
    pub(crate) fn flag(&self) -> &ExclusionFlag {
        &self.flag
    }
}
