//! Request id allocation for in-flight calls.
//!
//! Ids come from a bounded pool and are handed out from a rotating cursor,
//! so a just-released id is not immediately reused. An id is in use from
//! `allocate` until `release`; two in-flight requests never share one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

/// Number of distinct 16-bit request ids.
pub const ID_SPACE: usize = 1 << 16;

/// Default bound on concurrently in-flight requests.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("all {capacity} request ids are in flight")]
    Exhausted { capacity: usize },

    #[error("request id {0} is not allocated")]
    NotAllocated(u16),
}

/// Maps in-flight request ids to their pending context.
#[derive(Debug)]
pub struct RequestLedger<T> {
    entries: DashMap<u16, T>,
    cursor: AtomicU16,
    in_flight: AtomicUsize,
    capacity: usize,
}

impl<T> RequestLedger<T> {
    /// Create a ledger allowing `capacity` concurrent ids (clamped to 1..=65536).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, ID_SPACE);
        Self {
            entries: DashMap::with_capacity(capacity.min(1024)),
            cursor: AtomicU16::new(0),
            in_flight: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Reserve an id for `context`.
    ///
    /// Fails immediately when `capacity` ids are already in flight.
    pub fn allocate(&self, context: T) -> Result<u16, LedgerError> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .map_err(|_| LedgerError::Exhausted {
                capacity: self.capacity,
            })?;

        // A slot is reserved, so fewer than ID_SPACE ids are taken and the
        // scan always finds a vacant one.
        let mut context = Some(context);
        loop {
            let id = self.cursor.fetch_add(1, Ordering::Relaxed);
            if let Entry::Vacant(slot) = self.entries.entry(id) {
                if let Some(ctx) = context.take() {
                    slot.insert(ctx);
                }
                return Ok(id);
            }
        }
    }

    /// Release `id` and hand back its context.
    pub fn release(&self, id: u16) -> Result<T, LedgerError> {
        let (_, context) = self
            .entries
            .remove(&id)
            .ok_or(LedgerError::NotAllocated(id))?;
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        Ok(context)
    }

    /// Release every id, returning the contexts.
    pub fn drain(&self) -> Vec<(u16, T)> {
        // Collect keys first to avoid holding shard locks during removal
        let ids: Vec<u16> = self.entries.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.release(id).ok().map(|ctx| (id, ctx)))
            .collect()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of ids currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
