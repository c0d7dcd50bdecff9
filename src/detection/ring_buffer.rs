/// Sequence number of a frame within one detection session
pub type Sequence = u32;

/// Fixed-capacity circular store indexed by `seq % capacity`
///
/// Reads do not check that the slot still holds the sequence number the
/// caller has in mind: once the buffer wraps, `read(seq)` returns whatever was
/// written last at that slot. Callers track which offsets are valid.
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    written: usize,
}

impl<T> RingBuffer<T> {
    /// Capacity must be at least one slot
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot index used for `seq`
    pub fn slot(&self, seq: Sequence) -> usize {
        seq as usize % self.slots.len()
    }

    /// Store `value` at slot `seq % capacity`, overwriting the previous occupant
    pub fn write(&mut self, seq: Sequence, value: T) {
        let slot = self.slot(seq);
        if self.slots[slot].is_none() {
            self.written += 1;
        }
        self.slots[slot] = Some(value);
    }

    /// Value last written at slot `seq % capacity`, `None` if never written
    pub fn read(&self, seq: Sequence) -> Option<&T> {
        self.slots[self.slot(seq)].as_ref()
    }

    /// True once every slot has been written at least once
    pub fn is_filled(&self) -> bool {
        self.written == self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_every_write_before_wrap() {
        let mut ring = RingBuffer::with_capacity(8);
        for seq in 0..8u32 {
            ring.write(seq, seq * 10);
        }
        for seq in 0..8u32 {
            assert_eq!(ring.read(seq), Some(&(seq * 10)));
        }
        assert!(ring.is_filled());
    }

    #[test]
    fn wrapped_write_overwrites_slot() {
        let mut ring = RingBuffer::with_capacity(5);
        for seq in 0..=6u32 {
            ring.write(seq, format!("frame-{seq}"));
        }
        assert_eq!(ring.read(1).map(String::as_str), Some("frame-6"));
        assert_eq!(ring.read(2).map(String::as_str), Some("frame-2"));
    }

    #[test]
    fn unwritten_slot_reads_as_absent() {
        let mut ring = RingBuffer::with_capacity(3);
        ring.write(0, 'a');
        assert_eq!(ring.read(1), None);
        assert!(!ring.is_filled());
    }

    #[test]
    fn overwrite_does_not_count_twice() {
        let mut ring = RingBuffer::with_capacity(2);
        ring.write(0, 1);
        ring.write(2, 2);
        assert!(!ring.is_filled());
        ring.write(3, 3);
        assert!(ring.is_filled());
    }
}
