//! Fixed-capacity byte ring for frame reassembly
//!
//! Consuming bytes is O(1): the read position advances instead of shifting data.

use super::constants::MAX_FRAME_SIZE;

/// Largest contiguous view [`RingBuffer::get_slice`] can hand out
const STAGING_SIZE: usize = MAX_FRAME_SIZE;

/// Fixed-capacity ring buffer with O(1) advance
///
/// Generic const parameter `N` sets buffer capacity.
pub struct RingBuffer<const N: usize = 1024> {
    data: [u8; N],
    head: usize, // Write position (next empty slot)
    tail: usize, // Read position (first valid byte)
    len: usize,
    staging: [u8; STAGING_SIZE], // For views that wrap past the end of `data`
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            len: 0,
            staging: [0u8; STAGING_SIZE],
        }
    }

    /// Append as many bytes as fit, returning how many were taken
    ///
    /// Callers that must not lose data check the return value (or [`free`](Self::free))
    /// and drain before pushing the remainder.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        for &b in &bytes[..n] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % N;
        }
        self.len += n;
        n
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining capacity
    #[inline]
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % N])
        } else {
            None
        }
    }

    /// Find 2-byte sync pattern, returns offset from tail
    pub fn find_pattern_2(&self, b1: u8, b2: u8) -> Option<usize> {
        if self.len < 2 {
            return None;
        }
        (0..self.len - 1).find(|&i| {
            self.data[(self.tail + i) % N] == b1 && self.data[(self.tail + i + 1) % N] == b2
        })
    }

    /// Get contiguous slice (copies to staging if data wraps around)
    pub fn get_slice(&mut self, start: usize, len: usize) -> Option<&[u8]> {
        if start + len > self.len || len > STAGING_SIZE {
            return None;
        }

        let real_start = (self.tail + start) % N;

        if real_start + len <= N {
            Some(&self.data[real_start..real_start + len])
        } else {
            for i in 0..len {
                self.staging[i] = self.data[(real_start + i) % N];
            }
            Some(&self.staging[..len])
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
