//! Hierarchical timer wheel.
//!
//! Time is measured in millisecond ticks since the wheel was created. The
//! wheel has [`LEVELS`] levels of [`SLOTS`] slots each; slot `s` of level
//! `l` covers `64^l` ticks. A timer is stored at the lowest level whose
//! span still separates its deadline from the current tick, and cascades
//! one level down each time its slot comes due. Insert and removal are
//! O(1); expiry is amortized O(1) per timer.
//!
//! Removal is lazy: the entry leaves the id map at once, and the stale id
//! is discarded when its slot is next processed.

use super::timer::{TimerCallback, TimerEntry, TimerId};

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const LEVELS: usize = 6;
const SLOTS: usize = 64;
const SLOT_BITS: u32 = 6;
const SLOT_MASK: u64 = (SLOTS as u64) - 1;

/// Furthest deadline the wheel represents, in ticks (about 795 days).
const MAX_DURATION: u64 = (1 << (SLOT_BITS * LEVELS as u32)) - 1;

/// A due slot found by [`TimerWheel::next_expiration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Expiration {
    level: usize,
    slot: usize,
    deadline: u64,
}

struct Level {
    level: usize,
    /// Bit `s` is set when slot `s` holds at least one id.
    occupied: u64,
    slots: [Vec<TimerId>; SLOTS],
}

impl Level {
    fn new(level: usize) -> Self {
        Self {
            level,
            occupied: 0,
            slots: std::array::from_fn(|_| Vec::new()),
        }
    }

    fn add(&mut self, id: TimerId, when: u64) {
        let slot = slot_for(when, self.level);
        self.slots[slot].push(id);
        self.occupied |= 1 << slot;
    }

    fn take(&mut self, slot: usize) -> Vec<TimerId> {
        self.occupied &= !(1 << slot);
        std::mem::take(&mut self.slots[slot])
    }

    fn next_expiration(&self, now: u64) -> Option<Expiration> {
        let slot = self.next_occupied_slot(now)?;

        let slot_range = slot_range(self.level);
        let level_range = level_range(self.level);

        let level_start = now & !(level_range - 1);
        let mut deadline = level_start + slot as u64 * slot_range;

        if deadline <= now {
            // Only the top level wraps around.
            deadline += level_range;
        }

        Some(Expiration {
            level: self.level,
            slot,
            deadline,
        })
    }

    fn next_occupied_slot(&self, now: u64) -> Option<usize> {
        if self.occupied == 0 {
            return None;
        }

        let now_slot = (now / slot_range(self.level)) as usize % SLOTS;
        let rotated = self.occupied.rotate_right(now_slot as u32);
        let zeros = rotated.trailing_zeros() as usize;

        Some((zeros + now_slot) % SLOTS)
    }
}

fn slot_range(level: usize) -> u64 {
    (SLOTS as u64).pow(level as u32)
}

fn level_range(level: usize) -> u64 {
    (SLOTS as u64).pow(level as u32 + 1)
}

fn slot_for(when: u64, level: usize) -> usize {
    ((when >> (level as u32 * SLOT_BITS)) & SLOT_MASK) as usize
}

/// Level at which a timer due at `when` is stored, seen from `elapsed`.
fn level_for(elapsed: u64, when: u64) -> usize {
    let mut masked = (elapsed ^ when) | SLOT_MASK;

    if masked >= MAX_DURATION {
        masked = MAX_DURATION - 1;
    }

    let significant = 63 - masked.leading_zeros() as usize;
    significant / SLOT_BITS as usize
}

/// Rounds a duration up to whole ticks.
fn ticks(duration: Duration) -> u64 {
    duration.as_nanos().div_ceil(1_000_000).min(MAX_DURATION as u128) as u64
}

/// The timer store of one event pump.
pub(crate) struct TimerWheel {
    start: Instant,
    /// Last tick processed by [`poll_expired`](Self::poll_expired).
    elapsed: u64,
    levels: Vec<Level>,
    entries: HashMap<TimerId, TimerEntry>,
    /// Ids already due but not yet handed out.
    pending: VecDeque<TimerId>,
}

impl TimerWheel {
    pub(crate) fn new(start: Instant) -> Self {
        Self {
            start,
            elapsed: 0,
            levels: (0..LEVELS).map(Level::new).collect(),
            entries: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Number of live timers.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Schedules `callback` to fire `delay` after `now`, and every
    /// `interval` afterwards when one is given.
    ///
    /// The deadline is rounded up to the next tick, so a timer never fires
    /// before `now + delay`.
    pub(crate) fn insert(
        &mut self,
        id: TimerId,
        now: Instant,
        delay: Duration,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) {
        let when = self.deadline_tick(now, delay);

        self.entries.insert(
            id,
            TimerEntry {
                when,
                interval,
                callback: Some(callback),
            },
        );
        self.place(id, when);
    }

    /// Cancels a timer. Returns `false` when the id is unknown.
    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Time until the earliest deadline, zero when one is already due.
    pub(crate) fn next_timeout(&self, now: Instant) -> Option<Duration> {
        if !self.pending.is_empty() {
            return Some(Duration::ZERO);
        }

        let expiration = self.next_expiration()?;
        let deadline = self.start + Duration::from_millis(expiration.deadline);

        Some(deadline.saturating_duration_since(now))
    }

    /// Advances the wheel to `now` and returns every timer that is due.
    pub(crate) fn poll_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let now = self.tick_of(now);

        loop {
            match self.next_expiration() {
                Some(expiration) if expiration.deadline <= now => {
                    self.process(expiration);
                    self.elapsed = expiration.deadline;
                }
                _ => break,
            }
        }

        self.elapsed = self.elapsed.max(now);

        self.pending
            .drain(..)
            .filter(|id| self.entries.contains_key(id))
            .collect()
    }

    /// Takes the callback of a due timer so it can run without the wheel
    /// borrowed. One-shot timers leave the wheel here.
    pub(crate) fn take_callback(&mut self, id: TimerId) -> Option<TimerCallback> {
        let entry = self.entries.get_mut(&id)?;

        if entry.interval.is_some() {
            entry.callback.take()
        } else {
            self.entries.remove(&id).and_then(|entry| entry.callback)
        }
    }

    /// Hands a callback back after it ran.
    ///
    /// A repeating timer that is still registered is re-armed one interval
    /// after `now`, not after its previous deadline, so an overloaded loop
    /// does not accumulate a backlog. Anything else is dropped.
    pub(crate) fn rearm(&mut self, id: TimerId, now: Instant, callback: TimerCallback) {
        let Some(interval) = self.entries.get(&id).and_then(|entry| entry.interval) else {
            return;
        };

        let when = self.deadline_tick(now, interval);

        if let Some(entry) = self.entries.get_mut(&id) {
            entry.when = when;
            entry.callback = Some(callback);
        }
        self.place(id, when);
    }

    /// Drops every timer and its callback.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        for level in &mut self.levels {
            for slot in 0..SLOTS {
                level.take(slot);
            }
        }
    }

    fn tick_of(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.start).as_millis() as u64
    }

    fn deadline_tick(&self, now: Instant, delay: Duration) -> u64 {
        let since_start = now.saturating_duration_since(self.start);
        let when = ticks(since_start + delay);

        when.min(self.elapsed + MAX_DURATION)
    }

    fn place(&mut self, id: TimerId, when: u64) {
        if when <= self.elapsed {
            self.pending.push_back(id);
            return;
        }

        let level = level_for(self.elapsed, when);
        self.levels[level].add(id, when);
    }

    fn next_expiration(&self) -> Option<Expiration> {
        self.levels
            .iter()
            .find_map(|level| level.next_expiration(self.elapsed))
    }

    fn process(&mut self, expiration: Expiration) {
        let ids = self.levels[expiration.level].take(expiration.slot);

        for id in ids {
            let Some(when) = self.entries.get(&id).map(|entry| entry.when) else {
                continue;
            };

            if when <= expiration.deadline {
                self.pending.push_back(id);
            } else {
                let level = level_for(expiration.deadline, when);
                self.levels[level].add(id, when);
            }
        }
    }
}
