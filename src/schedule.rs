use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Handle to one requested frame callback. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(u64);

/// Display-refresh driven callback scheduling.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    /// Revoke a pending request. Returns false when the handle already fired
    /// or was cancelled before.
    fn cancel_frame(&mut self, handle: FrameHandle) -> bool;
}

/// Frame requests waiting for the next refresh tick.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_id: u64,
    pending: BTreeSet<u64>,
    cancelled: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles due on this refresh tick, in request order. They are removed
    /// from the queue, so each fires once.
    pub fn take_due(&mut self) -> Vec<FrameHandle> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(FrameHandle)
            .collect()
    }

    #[allow(dead_code)]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of cancel calls that revoked a pending request.
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        self.pending.insert(self.next_id);
        FrameHandle(self.next_id)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) -> bool {
        let removed = self.pending.remove(&handle.0);
        if removed {
            self.cancelled += 1;
        }
        removed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// One-shot deadline timers, the `setTimeout`/`clearTimeout` pair.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    deadlines: BTreeMap<u64, Instant>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timeout(&mut self, deadline: Instant) -> TimerHandle {
        self.next_id += 1;
        self.deadlines.insert(self.next_id, deadline);
        TimerHandle(self.next_id)
    }

    pub fn clear_timeout(&mut self, handle: TimerHandle) -> bool {
        self.deadlines.remove(&handle.0).is_some()
    }

    /// Remove and return every timer whose deadline is at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerHandle> {
        let due: Vec<u64> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&id, _)| id)
            .collect();
        for id in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(TimerHandle).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }
}
