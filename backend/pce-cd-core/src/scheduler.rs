//! Periodic timers, kept in a small fixed-capacity binary heap ordered by deadline

use bincode::{Decode, Encode};
use std::array;
use std::cmp::Ordering;

/// Scheduler ticks per second: 5x the 9.216 MHz CD clock. Every timer period used by the
/// controller is a whole number of ticks at this rate.
pub const TICKS_PER_SECOND: u64 = 46_080_000;

// 75 sectors per second
pub const SECTOR_PERIOD: u64 = TICKS_PER_SECOND / 75;

// 75 * 2048 bytes per second
pub const DMA_BYTE_PERIOD: u64 = TICKS_PER_SECOND / (75 * 2048);

// Decoder clock is 9.216 MHz / 6 / divider, and the decoder takes one nibble every 48 clocks
pub const ADPCM_NIBBLE_PERIOD_PER_DIVIDER: u64 = 6 * 48 * 5;

pub const FADE_PERIOD_100_US: u64 = TICKS_PER_SECOND / 10_000;
pub const FADE_PERIOD_1500_US: u64 = 15 * FADE_PERIOD_100_US;
pub const FADE_PERIOD_5000_US: u64 = 50 * FADE_PERIOD_100_US;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum TimerEvent {
    SectorRead = 0,
    AdpcmDma,
    AdpcmNibble,
    CddaFadeIn,
    CddaFadeOut,
    AdpcmFadeIn,
    AdpcmFadeOut,
    Dummy,
}

impl TimerEvent {
    pub const ALL: [Self; 8] = [
        Self::SectorRead,
        Self::AdpcmDma,
        Self::AdpcmNibble,
        Self::CddaFadeIn,
        Self::CddaFadeOut,
        Self::AdpcmFadeIn,
        Self::AdpcmFadeOut,
        Self::Dummy,
    ];

    fn as_bit(self) -> u32 {
        1 << (self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
struct HeapEntry {
    event: TimerEvent,
    cycles: u64,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cycles.cmp(&other.cycles)
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Scheduler {
    heap: [HeapEntry; TimerEvent::ALL.len()],
    len: usize,
    scheduled_bits: u32,
    periods: [u64; TimerEvent::ALL.len()],
}

impl Scheduler {
    pub fn new() -> Self {
        // Initialize with a dummy event to avoid ever needing to check if the heap is empty
        Self {
            heap: array::from_fn(|_| HeapEntry { event: TimerEvent::Dummy, cycles: u64::MAX }),
            len: 1,
            scheduled_bits: TimerEvent::Dummy.as_bit(),
            periods: [0; TimerEvent::ALL.len()],
        }
    }

    /// Arm a repeating timer that first fires `period` ticks after `now`. Re-arming an armed timer
    /// restarts its phase.
    pub fn arm(&mut self, event: TimerEvent, now: u64, period: u64) {
        debug_assert!(period != 0);

        log::trace!("Arming timer {event:?} at {now} with period {period}");

        self.periods[event as usize] = period;
        self.insert_or_update(event, now + period);
    }

    pub fn disarm(&mut self, event: TimerEvent) {
        if !self.is_armed(event) {
            return;
        }

        log::trace!("Disarming timer {event:?}");

        self.periods[event as usize] = 0;
        self.remove(event);
    }

    pub fn is_armed(&self, event: TimerEvent) -> bool {
        self.scheduled_bits & event.as_bit() != 0
    }

    pub fn period(&self, event: TimerEvent) -> Option<u64> {
        self.is_armed(event).then_some(self.periods[event as usize])
    }

    /// Pop the earliest timer due at or before `cycles`. The timer is re-armed one period later
    /// before it is returned, so the caller's callback is free to disarm it.
    pub fn pop(&mut self, cycles: u64) -> Option<(TimerEvent, u64)> {
        if cycles < self.heap[0].cycles {
            return None;
        }

        let HeapEntry { event, cycles } = self.heap[0];
        let period = self.periods[event as usize];
        self.heap[0].cycles = cycles + period;
        self.heap_down(0);

        Some((event, cycles))
    }

    // Insert if event is not present, update cycles if it is present
    fn insert_or_update(&mut self, event: TimerEvent, cycles: u64) {
        if self.is_armed(event) {
            for i in 0..self.len {
                if self.heap[i].event != event {
                    continue;
                }

                let old_cycles = self.heap[i].cycles;
                self.heap[i].cycles = cycles;

                match cycles.cmp(&old_cycles) {
                    Ordering::Less => self.heap_up(i),
                    Ordering::Greater => self.heap_down(i),
                    Ordering::Equal => {}
                }

                return;
            }
        }
        self.scheduled_bits |= event.as_bit();

        self.heap[self.len] = HeapEntry { event, cycles };
        self.len += 1;
        self.heap_up(self.len - 1);
    }

    fn remove(&mut self, event: TimerEvent) {
        self.scheduled_bits &= !event.as_bit();

        for i in 0..self.len {
            if self.heap[i].event == event {
                let old_cycles = self.heap[i].cycles;
                self.heap.swap(i, self.len - 1);
                self.len -= 1;

                if i < self.len {
                    match self.heap[i].cycles.cmp(&old_cycles) {
                        Ordering::Less => self.heap_up(i),
                        Ordering::Greater => self.heap_down(i),
                        Ordering::Equal => {}
                    }
                }

                return;
            }
        }
    }

    fn heap_up(&mut self, mut i: usize) {
        while i != 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent] <= self.heap[i] {
                return;
            }

            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn heap_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            if left >= self.len {
                return;
            }
            let right = left + 1;

            let smallest =
                if right < self.len && self.heap[right] < self.heap[left] { right } else { left };
            if self.heap[smallest] >= self.heap[i] {
                return;
            }

            self.heap.swap(i, smallest);
            i = smallest;
        }
    }
}
