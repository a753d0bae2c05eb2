//! Double-buffered per-school summaries.
//!
//! Every school reads the summaries all schools published during the previous
//! frame and publishes its own summary for the next one. The two banks are
//! flipped by [`SchoolStateManager::begin_frame`], which must only be called
//! between frames, while no worker is animating.
//!
//! Slots hold the raw bits of their floats in atomics, so concurrent readers
//! of the read bank and the single writer of each write slot never need a
//! lock. Relaxed ordering is enough: the frame start/done barrier orders
//! every write before the flip that exposes it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::vector::Vector3;

/// Summary of one school as seen by the other schools
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SchoolState {
    pub aggression: f32,
    pub center: Vector3,
    pub radius: f32,
}

#[derive(Debug, Default)]
struct StateSlot {
    aggression: AtomicU32,
    center: [AtomicU32; 3],
    radius: AtomicU32,
}

impl StateSlot {
    fn load(&self) -> SchoolState {
        let f = |a: &AtomicU32| f32::from_bits(a.load(Ordering::Relaxed));
        SchoolState {
            aggression: f(&self.aggression),
            center: Vector3::new(f(&self.center[0]), f(&self.center[1]), f(&self.center[2])),
            radius: f(&self.radius),
        }
    }

    fn store(&self, state: &SchoolState) {
        let s = |a: &AtomicU32, v: f32| a.store(v.to_bits(), Ordering::Relaxed);
        s(&self.aggression, state.aggression);
        s(&self.center[0], state.center.x);
        s(&self.center[1], state.center.y);
        s(&self.center[2], state.center.z);
        s(&self.radius, state.radius);
    }
}

fn bank(len: usize) -> Box<[StateSlot]> {
    (0..len).map(|_| StateSlot::default()).collect::<Vec<_>>().into_boxed_slice()
}

/// Owns the read and write banks of school summaries
#[derive(Debug)]
pub struct SchoolStateManager {
    banks: [Box<[StateSlot]>; 2],
    read_bank: AtomicUsize,
    num_read: AtomicUsize,
    num_write: AtomicUsize,
}

impl SchoolStateManager {
    pub fn new(max_schools: usize) -> Self {
        Self {
            banks: [bank(max_schools), bank(max_schools)],
            read_bank: AtomicUsize::new(0),
            num_read: AtomicUsize::new(0),
            num_write: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.banks[0].len()
    }

    /// Promote the bank written last frame to the read bank and open the
    /// other one for `active_schools` writers
    pub fn begin_frame(&self, active_schools: usize) {
        let read = self.read_bank.load(Ordering::Acquire);
        self.read_bank.store(read ^ 1, Ordering::Release);
        self.num_read
            .store(self.num_write.load(Ordering::Acquire), Ordering::Release);
        self.num_write
            .store(active_schools.min(self.capacity()), Ordering::Release);
    }

    pub fn num_read_states(&self) -> usize {
        self.num_read.load(Ordering::Acquire)
    }

    pub fn num_write_states(&self) -> usize {
        self.num_write.load(Ordering::Acquire)
    }

    /// Summaries published during the previous frame
    pub fn read_states(&self) -> ReadStates<'_> {
        let bank = self.read_bank.load(Ordering::Acquire);
        ReadStates {
            slots: &self.banks[bank][..self.num_read_states()],
        }
    }

    /// Slots being published during the current frame
    pub fn write_states(&self) -> WriteStates<'_> {
        let bank = self.read_bank.load(Ordering::Acquire) ^ 1;
        WriteStates {
            slots: &self.banks[bank][..self.num_write_states()],
        }
    }
}

/// Read-only view of the previous frame's summaries
#[derive(Debug, Clone, Copy)]
pub struct ReadStates<'a> {
    slots: &'a [StateSlot],
}

impl<'a> ReadStates<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SchoolState> {
        self.slots.get(index).map(StateSlot::load)
    }

    pub fn iter(&self) -> impl Iterator<Item = SchoolState> + 'a {
        self.slots.iter().map(StateSlot::load)
    }
}

/// Write handle for the current frame's summaries.
///
/// Each slot must be written by exactly one school per frame.
#[derive(Debug, Clone, Copy)]
pub struct WriteStates<'a> {
    slots: &'a [StateSlot],
}

impl WriteStates<'_> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Publish the summary for `index`; returns false if the slot is not
    /// open this frame
    pub fn publish(&self, index: usize, state: &SchoolState) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                slot.store(state);
                true
            }
            None => false,
        }
    }
}

/// Read and write views handed to a school for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameStates<'a> {
    pub read: ReadStates<'a>,
    pub write: WriteStates<'a>,
}

impl SchoolStateManager {
    pub fn frame_states(&self) -> FrameStates<'_> {
        FrameStates {
            read: self.read_states(),
            write: self.write_states(),
        }
    }
}
