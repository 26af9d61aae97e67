//! This module provides the [`CodeBuffer`] struct, a bounded append-only byte sink the x86
//! emitter writes into. A buffer either borrows a mutable window of the code region or owns a
//! private vector (used by the encoder unit tests).
//!
//! Overflow is sticky: once an append or patch is dropped, the buffer stays in the error state
//! until [`CodeBuffer::reset`], and the partially emitted block must not be installed.

enum Storage<'a> {
    /// A window into the code region.
    Borrowed(&'a mut [u8]),
    /// A private allocation.
    Owned(Vec<u8>),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Borrowed(bytes) => bytes,
            Storage::Owned(bytes) => bytes,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Borrowed(bytes) => bytes,
            Storage::Owned(bytes) => bytes,
        }
    }
}

/// An append-only code buffer with backpatching of previously emitted 32-bit fields.
pub struct CodeBuffer<'a> {
    storage: Storage<'a>,
    offset: usize,
    error: bool,
}

impl<'a> CodeBuffer<'a> {
    /// Creates a buffer that appends into the given window.
    pub fn new(window: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::Borrowed(window),
            offset: 0,
            error: false,
        }
    }

    /// Creates a buffer that owns a private allocation of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0; capacity]),
            offset: 0,
            error: false,
        }
    }

    /// The buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.bytes().len()
    }

    /// The current write position.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True iff any append or patch was dropped.
    #[inline]
    pub fn error(&self) -> bool {
        self.error
    }

    /// Appends one byte. On overflow the byte is discarded and the error state is set.
    #[inline]
    pub fn append_u8(&mut self, byte: u8) {
        if self.error || self.offset == self.capacity() {
            self.error = true;
            return;
        }

        self.storage.bytes_mut()[self.offset] = byte;
        self.offset += 1;
    }

    /// Appends a 32-bit word in little-endian order.
    #[inline]
    pub fn append_u32_le(&mut self, word: u32) {
        for byte in word.to_le_bytes() {
            self.append_u8(byte);
        }
    }

    /// Appends a 64-bit word in little-endian order.
    #[inline]
    pub fn append_u64_le(&mut self, word: u64) {
        for byte in word.to_le_bytes() {
            self.append_u8(byte);
        }
    }

    /// Appends a byte slice.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.append_u8(byte);
        }
    }

    /// Replaces the four bytes at `at` with the little-endian encoding of `word`. `at + 4` must
    /// not exceed the capacity; otherwise nothing is written and the error state is set.
    pub fn patch_u32_le(&mut self, at: usize, word: u32) {
        if at + 4 > self.capacity() {
            self.error = true;
            return;
        }

        self.storage.bytes_mut()[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }

    /// Clears the write position and the error state. The underlying bytes are left as they are;
    /// subsequent appends overwrite them.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.error = false;
    }

    /// The bytes emitted so far.
    pub fn bytes(&self) -> &[u8] {
        &self.storage.bytes()[..self.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_offset() {
        let mut buf = CodeBuffer::with_capacity(8);

        buf.append_u8(0x90);
        buf.append_u32_le(0x0102_0304);

        assert_eq!(buf.offset(), 5);
        assert_eq!(buf.bytes(), &[0x90, 0x04, 0x03, 0x02, 0x01]);
        assert!(!buf.error());
    }

    #[test]
    fn overflow_is_sticky() {
        let mut buf = CodeBuffer::with_capacity(2);

        buf.append_u8(1);
        buf.append_u8(2);
        assert!(!buf.error());

        buf.append_u8(3);
        assert!(buf.error());

        // Appends keep being dropped even though no capacity check would now trip.
        buf.reset();
        assert!(!buf.error());
        buf.append_u8(4);
        assert_eq!(buf.bytes(), &[4]);
    }

    #[test]
    fn patch_in_bounds() {
        let mut buf = CodeBuffer::with_capacity(8);

        buf.append_u32_le(0);
        buf.patch_u32_le(0, 0xdead_beef);

        assert_eq!(buf.bytes(), &0xdead_beef_u32.to_le_bytes());
        assert!(!buf.error());
    }

    #[test]
    fn patch_out_of_bounds_sets_error() {
        let mut buf = CodeBuffer::with_capacity(4);

        buf.patch_u32_le(2, 1);
        assert!(buf.error());
    }
}
