// src/fifo.rs

//! Byte FIFO backing a keystroke stream.
//!
//! Bytes are appended at the back and popped from the front. There is no
//! fixed cap: the capacity given at construction is only a starting hint and
//! the queue grows with the producer.

use std::collections::VecDeque;

/// Initial capacity of a keystroke FIFO, in bytes.
pub const DEFAULT_FIFO_CAPACITY: usize = 2000;

/// An append/pop byte queue.
#[derive(Debug, Clone, Default)]
pub struct ByteFifo {
    bytes: VecDeque<u8>,
}

impl ByteFifo {
    /// Creates an empty FIFO with room for `capacity` bytes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        ByteFifo {
            bytes: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn put_byte(&mut self, byte: u8) {
        self.bytes.push_back(byte);
    }

    pub fn put(&mut self, block: &[u8]) {
        self.bytes.extend(block.iter().copied());
    }

    /// Pops the oldest byte, or `None` if the FIFO is empty.
    #[inline]
    pub fn get_byte(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Discards everything, keeping the allocation.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_come_out_in_order() {
        let mut fifo = ByteFifo::with_capacity(4);
        fifo.put_byte(1);
        fifo.put(&[2, 3, 4, 5, 6]);
        assert_eq!(fifo.len(), 6);

        let drained: Vec<u8> = std::iter::from_fn(|| fifo.get_byte()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5, 6]);
        assert!(fifo.is_empty());
        assert_eq!(fifo.get_byte(), None);
    }

    #[test]
    fn test_reset_discards_contents() {
        let mut fifo = ByteFifo::default();
        fifo.put(b"abc");
        fifo.reset();
        assert!(fifo.is_empty());
        assert_eq!(fifo.get_byte(), None);
    }
}
