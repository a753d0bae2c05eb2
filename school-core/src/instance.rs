//! Ring of per-frame instance buffers.
//!
//! The CPU fills one slot per frame while the renderer may still be reading
//! slots filled on earlier frames. A slot handed to the renderer with
//! [`InstanceRing::submit`] stays in flight until [`InstanceRing::retire`]
//! reports that frame as complete, and is never handed out for writing in
//! the meantime.

use alloc::vec;
use alloc::vec::Vec;

use bytemuck::{Pod, Zeroable};

use crate::vector::Vector3;

/// Default number of buffers in a ring
pub const DEFAULT_RING_DEPTH: usize = 4;

/// Per-fish record consumed by the instanced fish shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FishInstanceData {
    pub position: [f32; 3],
    pub heading: [f32; 3],
    pub tail_time: f32,
}

impl FishInstanceData {
    pub fn new(position: Vector3, heading: Vector3, tail_time: f32) -> Self {
        Self {
            position: position.to_array(),
            heading: heading.to_array(),
            tail_time,
        }
    }
}

/// Lifecycle of one ring slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never written, or retired by the renderer; free to overwrite
    Free,
    /// Written and published, not yet submitted for drawing
    Ready,
    /// Submitted for the given frame and possibly still being read
    InFlight(u64),
}

#[derive(Debug, Clone)]
struct Slot<T> {
    data: Vec<T>,
    len: usize,
    state: SlotState,
}

#[derive(Debug, Clone)]
pub struct InstanceRing<T: Pod> {
    slots: Vec<Slot<T>>,
    capacity: usize,
    current: usize,
    published: bool,
}

impl<T: Pod> InstanceRing<T> {
    /// `depth` buffers holding `capacity` records each; depth is at least 2
    pub fn new(capacity: usize, depth: usize) -> Self {
        let depth = depth.max(2);
        let slots = (0..depth)
            .map(|_| Slot {
                data: vec![T::zeroed(); capacity],
                len: 0,
                state: SlotState::Free,
            })
            .collect();
        Self {
            slots,
            capacity,
            // First begin_update lands on slot 0
            current: depth - 1,
            published: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of one slot, rounded up to a multiple of 4
    pub fn slot_stride(&self) -> usize {
        (self.capacity * core::mem::size_of::<T>() + 3) & !3
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|s| s.state)
    }

    /// Claim the next slot for writing.
    ///
    /// Returns `None` when that slot is still in flight; the caller should
    /// skip this frame's upload and try again next frame.
    pub fn begin_update(&mut self) -> Option<InstanceWriter<'_, T>> {
        let next = (self.current + 1) % self.slots.len();
        if let SlotState::InFlight(_) = self.slots[next].state {
            return None;
        }
        self.current = next;
        Some(InstanceWriter {
            ring: self,
            index: next,
            len: 0,
        })
    }

    fn end_update(&mut self, index: usize, len: usize) {
        let slot = &mut self.slots[index];
        slot.len = len;
        slot.state = SlotState::Ready;
        self.published = true;
    }

    /// Records of the most recently published slot
    pub fn latest(&self) -> Option<&[T]> {
        if !self.published {
            return None;
        }
        let slot = &self.slots[self.current];
        Some(&slot.data[..slot.len])
    }

    /// Hand the most recently published slot to the renderer for `frame`
    pub fn submit(&mut self, frame: u64) -> Option<DrawSource<'_, T>> {
        if !self.published {
            return None;
        }
        let stride = self.slot_stride();
        let index = self.current;
        let slot = &mut self.slots[index];
        // The current slot keeps the latest data even after it was retired,
        // since only begin_update moves `current` to a slot it overwrites
        slot.state = match slot.state {
            SlotState::Free | SlotState::Ready => SlotState::InFlight(frame),
            SlotState::InFlight(prev) => SlotState::InFlight(prev.max(frame)),
        };
        Some(DrawSource {
            slot: index,
            byte_offset: index * stride,
            instances: &slot.data[..slot.len],
        })
    }

    /// Release every slot submitted on or before `completed_frame`
    pub fn retire(&mut self, completed_frame: u64) -> usize {
        let mut released = 0;
        for slot in &mut self.slots {
            if let SlotState::InFlight(frame) = slot.state {
                if frame <= completed_frame {
                    slot.state = SlotState::Free;
                    released += 1;
                }
            }
        }
        released
    }
}

/// Write access to one claimed slot; publishes the slot when dropped
pub struct InstanceWriter<'a, T: Pod> {
    ring: &'a mut InstanceRing<T>,
    index: usize,
    len: usize,
}

impl<T: Pod> InstanceWriter<'_, T> {
    pub fn slot(&self) -> usize {
        self.index
    }

    /// Append one record; returns false once the slot is full
    pub fn push(&mut self, value: T) -> bool {
        let data = &mut self.ring.slots[self.index].data;
        match data.get_mut(self.len) {
            Some(dst) => {
                *dst = value;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Pod> Drop for InstanceWriter<'_, T> {
    fn drop(&mut self) {
        self.ring.end_update(self.index, self.len);
    }
}

/// A published slot as seen by the renderer
#[derive(Debug, Clone, Copy)]
pub struct DrawSource<'a, T: Pod> {
    pub slot: usize,
    /// Offset of the slot inside the whole ring allocation
    pub byte_offset: usize,
    pub instances: &'a [T],
}

impl<T: Pod> DrawSource<'_, T> {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Raw bytes ready to copy into a GPU buffer
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ring: &mut InstanceRing<FishInstanceData>, n: usize, tail: f32) -> Option<usize> {
        let mut writer = ring.begin_update()?;
        for _ in 0..n {
            writer.push(FishInstanceData {
                tail_time: tail,
                ..FishInstanceData::default()
            });
        }
        Some(writer.slot())
    }

    #[test]
    fn test_instance_layout() {
        assert_eq!(core::mem::size_of::<FishInstanceData>(), 28);
    }

    #[test]
    fn test_nothing_to_draw_before_first_upload() {
        let mut ring = InstanceRing::<FishInstanceData>::new(8, 4);
        assert!(ring.latest().is_none());
        assert!(ring.submit(1).is_none());
    }

    #[test]
    fn test_slots_rotate() {
        let mut ring = InstanceRing::<FishInstanceData>::new(8, 4);
        let slots: Vec<usize> = (0..5).map(|_| fill(&mut ring, 2, 0.0).unwrap()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 0]);
        assert_eq!(ring.latest().map(|d| d.len()), Some(2));
    }

    #[test]
    fn test_in_flight_slot_is_never_reused() {
        let mut ring = InstanceRing::<FishInstanceData>::new(4, 4);
        for frame in 1..=4 {
            fill(&mut ring, 1, frame as f32).unwrap();
            assert!(ring.submit(frame).is_some());
        }
        // All four slots are in flight: the upload must back off
        assert!(ring.begin_update().is_none());
        assert_eq!(ring.current_index(), 3);

        assert_eq!(ring.retire(1), 1);
        assert_eq!(fill(&mut ring, 1, 5.0), Some(0));
        assert!(ring.begin_update().is_none());
    }

    #[test]
    fn test_push_stops_at_capacity() {
        let mut ring = InstanceRing::<FishInstanceData>::new(2, 2);
        let mut writer = ring.begin_update().unwrap();
        assert!(writer.push(FishInstanceData::default()));
        assert!(writer.push(FishInstanceData::default()));
        assert!(!writer.push(FishInstanceData::default()));
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_draw_source_offsets() {
        let mut ring = InstanceRing::<FishInstanceData>::new(3, 4);
        fill(&mut ring, 3, 1.0);
        fill(&mut ring, 3, 2.0);
        let source = ring.submit(7).unwrap();
        assert_eq!(source.slot, 1);
        assert_eq!(source.byte_offset, 84);
        assert_eq!(source.as_bytes().len(), 84);
        assert_eq!(source.instances[0].tail_time, 2.0);
        assert_eq!(ring.slot_state(1), Some(SlotState::InFlight(7)));
    }

    #[test]
    fn test_minimum_depth() {
        let ring = InstanceRing::<FishInstanceData>::new(1, 0);
        assert_eq!(ring.depth(), 2);
    }
}
