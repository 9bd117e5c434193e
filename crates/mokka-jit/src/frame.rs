//! Abstract stack-frame layout
//!
//! The frame is a sequence of 32-bit slots in two regions: argument slots
//! at successive positive offsets above the frame base, and locals plus
//! spill storage at successive negative offsets below it. 64-bit values
//! consume two slot indices. Slot assignment is monotonic; a slot is
//! never reused within a unit.
//!
//! The offset formulas here are the canonical 32-bit-word layout (the
//! register-starved form where arguments arrive on the stack); the x86-64
//! emitter maps the same slot indices onto its own 8-byte frame cells and
//! spills register-passed arguments there in the prolog.

/// Offset of the first argument slot above the frame base: saved base
/// pointer, return address, and three callee-saved words sit in between.
const ARGS_START: i32 = 0x14;

/// Slot width in the canonical layout
const SLOT_SIZE: i32 = 4;

/// A frame slot handle; offsets are computed by the owning frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub index: u32,
}

/// Per-method frame descriptor
#[derive(Debug, Clone)]
pub struct StackFrame {
    nr_args: u32,
    nr_local_slots: u32,
    nr_spill_slots: u32,
}

impl StackFrame {
    /// `nr_local_slots` counts every local-variable slot including the
    /// arguments (the JVM `max_locals` value).
    pub fn new(nr_args: u32, nr_local_slots: u32) -> StackFrame {
        StackFrame {
            nr_args,
            nr_local_slots,
            nr_spill_slots: 0,
        }
    }

    pub fn nr_args(&self) -> u32 {
        self.nr_args
    }

    pub fn nr_local_slots(&self) -> u32 {
        self.nr_local_slots
    }

    pub fn nr_spill_slots(&self) -> u32 {
        self.nr_spill_slots
    }

    /// Slot of local variable `index` (arguments are locals `0..nr_args`).
    pub fn local_slot(&self, index: u32) -> StackSlot {
        debug_assert!(index < self.nr_local_slots);
        StackSlot { index }
    }

    fn alloc_spill(&mut self, size: u32) -> StackSlot {
        let slot = StackSlot {
            index: self.nr_local_slots + self.nr_spill_slots,
        };
        self.nr_spill_slots += size;
        slot
    }

    /// Allocate a 32-bit spill slot.
    pub fn spill_slot_32(&mut self) -> StackSlot {
        self.alloc_spill(1)
    }

    /// Allocate a 64-bit spill slot (consumes two 32-bit indices).
    pub fn spill_slot_64(&mut self) -> StackSlot {
        self.alloc_spill(2)
    }

    /// Frame-base-relative offset of a slot in the canonical layout.
    pub fn slot_offset(&self, slot: StackSlot) -> i32 {
        if slot.index < self.nr_args {
            ARGS_START + slot.index as i32 * SLOT_SIZE
        } else {
            -(((slot.index - self.nr_args) as i32 + 1) * SLOT_SIZE)
        }
    }

    /// Size of the below-base region (locals plus spills) in the canonical
    /// layout; what the prolog reserves.
    pub fn locals_size(&self) -> u32 {
        (self.nr_local_slots - self.nr_args + self.nr_spill_slots) * SLOT_SIZE as u32
    }

    /// x86-64 mapping: every slot index gets an 8-byte cell below the
    /// frame base; incoming register arguments are stored here by the
    /// prolog.
    pub fn slot_offset_x64(&self, slot: StackSlot) -> i32 {
        -((slot.index as i32 + 1) * 8)
    }

    /// Bytes the x86-64 prolog subtracts from rsp, 16-byte aligned.
    pub fn frame_size_x64(&self) -> u32 {
        let raw = (self.nr_local_slots + self.nr_spill_slots) * 8;
        raw.div_ceil(16) * 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NR_ARGS: u32 = 2;
    // 32-bit, 64-bit, and 32-bit slots, respectively.
    const NR_LOCAL_SLOTS: u32 = 4;

    #[test]
    fn test_local_slots_are_in_sequential_order() {
        let frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        assert_eq!(frame.local_slot(0).index, 0);
        assert_eq!(frame.local_slot(1).index, 1);
        assert_eq!(frame.local_slot(3).index, 3);
    }

    #[test]
    fn test_32_bit_spill_slot_occupies_one_index() {
        let mut frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        assert_eq!(frame.spill_slot_32().index, 4);
        assert_eq!(frame.spill_slot_32().index, 5);
    }

    #[test]
    fn test_64_bit_spill_slot_occupies_two_indices() {
        let mut frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        assert_eq!(frame.spill_slot_64().index, 4);
        assert_eq!(frame.spill_slot_64().index, 6);
    }

    #[test]
    fn test_arguments_are_at_successive_positive_offsets() {
        let frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        assert_eq!(frame.slot_offset(frame.local_slot(0)), 0x14);
        assert_eq!(frame.slot_offset(frame.local_slot(1)), 0x18);
    }

    #[test]
    fn test_locals_are_at_successive_negative_offsets() {
        let frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        assert_eq!(frame.slot_offset(frame.local_slot(2)), -0x4);
        assert_eq!(frame.slot_offset(frame.local_slot(3)), -0x8);
        assert_eq!(frame.locals_size(), 8);
    }

    #[test]
    fn test_spill_storage_follows_locals() {
        let mut frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        let spill1 = frame.spill_slot_64();
        let spill2 = frame.spill_slot_32();
        assert_eq!(frame.slot_offset(spill1), -0xC);
        assert_eq!(frame.slot_offset(spill2), -0x14);
        assert_eq!(frame.locals_size(), 20);
    }

    #[test]
    fn test_x64_slots_are_disjoint_negative_cells() {
        let mut frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        let spill = frame.spill_slot_64();
        assert_eq!(frame.slot_offset_x64(frame.local_slot(0)), -8);
        assert_eq!(frame.slot_offset_x64(frame.local_slot(3)), -32);
        assert_eq!(frame.slot_offset_x64(spill), -40);
    }

    #[test]
    fn test_x64_frame_size_is_16_aligned() {
        let mut frame = StackFrame::new(NR_ARGS, NR_LOCAL_SLOTS);
        frame.spill_slot_64();
        frame.spill_slot_32();
        // 7 slots * 8 bytes = 56, aligned up to 64
        assert_eq!(frame.frame_size_x64(), 64);
        assert_eq!(frame.frame_size_x64() % 16, 0);
    }
}
