use crate::catalog::MediaKind;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed,
    TimedOut,
}

impl LoadState {
    pub fn is_terminal(self) -> bool {
        self != LoadState::Pending
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: MediaKind,
    state: LoadState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub pending: usize,
    pub ready: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Decides when the globe has settled enough to drop its loading affordance.
/// The flip to ready happens once and is never undone.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    slots: Vec<Slot>,
    activated_at: Instant,
    video_wait: Duration,
    global_deadline: Duration,
    ready_at: Option<Instant>,
    timed_out: Vec<usize>,
}

impl ReadinessGate {
    pub fn new(
        kinds: impl IntoIterator<Item = MediaKind>,
        activated_at: Instant,
        video_wait: Duration,
        global_deadline: Duration,
    ) -> Self {
        let slots = kinds.into_iter().map(|kind| Slot { kind, state: LoadState::Pending }).collect();
        let mut gate = Self { slots, activated_at, video_wait, global_deadline, ready_at: None, timed_out: Vec::new() };
        gate.settle(activated_at);
        gate
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, slot: usize) -> Option<LoadState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn mark_ready(&mut self, slot: usize, now: Instant) -> bool {
        self.transition(slot, LoadState::Ready, now)
    }

    pub fn mark_failed(&mut self, slot: usize, now: Instant) -> bool {
        self.transition(slot, LoadState::Failed, now)
    }

    /// Applies per-video waits and the global deadline. Returns true on the
    /// call that flips the gate.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.ready_at.is_some() {
            return false;
        }
        if now.saturating_duration_since(self.activated_at) >= self.video_wait {
            for (index, slot) in self.slots.iter_mut().enumerate() {
                if slot.kind == MediaKind::Video && slot.state == LoadState::Pending {
                    slot.state = LoadState::TimedOut;
                    self.timed_out.push(index);
                }
            }
        }
        self.settle(now)
    }

    /// Slots moved to `TimedOut` since the last call.
    pub fn take_timed_out(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.timed_out)
    }

    pub fn video_wait(&self) -> Duration {
        self.video_wait
    }

    pub fn is_ready(&self) -> bool {
        self.ready_at.is_some()
    }

    pub fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    pub fn activated_at(&self) -> Instant {
        self.activated_at
    }

    /// Latest instant at which the gate is guaranteed to have flipped. Images
    /// have no wait of their own, so any image slot leaves only the global
    /// deadline.
    pub fn worst_case_deadline(&self) -> Instant {
        let only_videos = self.slots.iter().all(|slot| slot.kind == MediaKind::Video);
        if only_videos {
            self.activated_at + self.video_wait.min(self.global_deadline)
        } else {
            self.activated_at + self.global_deadline
        }
    }

    pub fn counts(&self) -> LoadCounts {
        let mut counts = LoadCounts::default();
        for slot in &self.slots {
            match slot.state {
                LoadState::Pending => counts.pending += 1,
                LoadState::Ready => counts.ready += 1,
                LoadState::Failed => counts.failed += 1,
                LoadState::TimedOut => counts.timed_out += 1,
            }
        }
        counts
    }

    fn transition(&mut self, slot: usize, next: LoadState, now: Instant) -> bool {
        let Some(entry) = self.slots.get_mut(slot) else {
            return false;
        };
        if entry.state.is_terminal() {
            return false;
        }
        entry.state = next;
        self.settle(now)
    }

    fn settle(&mut self, now: Instant) -> bool {
        if self.ready_at.is_some() {
            return false;
        }
        let all_terminal = self.slots.iter().all(|slot| slot.state.is_terminal());
        let expired = now.saturating_duration_since(self.activated_at) >= self.global_deadline;
        if all_terminal || expired {
            self.ready_at = Some(now);
            true
        } else {
            false
        }
    }
}
