//! # Packed Frame States
//!
//! Every frame of a pool is in one of four states, stored in two bits:
//!
//! ```text
//! byte i/4:  | f3 | f2 | f1 | f0 |     bits 2*(i%4) .. 2*(i%4)+1
//!            7                  0
//! ```
//!
//! One metadata frame therefore describes `4 * PAGE_SIZE` frames.

/// State of a single frame.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameState {
    Free = 0b00,
    /// First frame of an allocated run.
    HeadOfSequence = 0b01,
    /// Never handed out, never released (memory holes).
    Inaccessible = 0b10,
    /// Continuation frame of an allocated run.
    Allocated = 0b11,
}

impl FrameState {
    const MASK: u8 = 0b11;

    #[inline]
    const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0b00 => Self::Free,
            0b01 => Self::HeadOfSequence,
            0b10 => Self::Inaccessible,
            _ => Self::Allocated,
        }
    }
}

/// A borrowed table of `len` packed frame states.
pub struct FrameStateMap<'m> {
    bytes: &'m mut [u8],
    len: u32,
}

impl<'m> FrameStateMap<'m> {
    /// Frames described per byte.
    pub const FRAMES_PER_BYTE: u32 = 4;

    /// Wrap `bytes` as the state table of `len` frames.
    ///
    /// The contents are taken as they are; call [`fill`](Self::fill) to
    /// initialize.
    #[must_use]
    pub fn new(bytes: &'m mut [u8], len: u32) -> Self {
        debug_assert!(bytes.len() as u64 * u64::from(Self::FRAMES_PER_BYTE) >= u64::from(len));
        Self { bytes, len }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    const fn locate(i: u32) -> (usize, u32) {
        ((i / Self::FRAMES_PER_BYTE) as usize, 2 * (i % Self::FRAMES_PER_BYTE))
    }

    /// State of frame `i` (relative to the pool base).
    #[inline]
    #[must_use]
    pub fn get(&self, i: u32) -> FrameState {
        debug_assert!(i < self.len);
        let (byte, shift) = Self::locate(i);
        FrameState::from_bits(self.bytes[byte] >> shift)
    }

    #[inline]
    pub fn set(&mut self, i: u32, state: FrameState) {
        debug_assert!(i < self.len);
        let (byte, shift) = Self::locate(i);
        let b = &mut self.bytes[byte];
        *b = (*b & !(FrameState::MASK << shift)) | ((state as u8) << shift);
    }

    /// Set every frame to `state`.
    pub fn fill(&mut self, state: FrameState) {
        let pattern = (0..Self::FRAMES_PER_BYTE).fold(0u8, |acc, k| acc | ((state as u8) << (2 * k)));
        self.bytes.fill(pattern);
    }

    /// Mark `[start, start + n)` as one allocated run.
    pub fn mark_run(&mut self, start: u32, n: u32) {
        debug_assert!(n > 0);
        self.set(start, FrameState::HeadOfSequence);
        for i in start + 1..start + n {
            self.set(i, FrameState::Allocated);
        }
    }

    /// The first frame of `[start, start + n)` that is not free, if any.
    pub fn first_busy(&self, start: u32, n: u32) -> Option<u32> {
        (start..start + n).find(|&i| self.get(i) != FrameState::Free)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn count(&self, state: FrameState) -> u32 {
        // At most `self.len` frames match.
        (0..self.len).filter(|&i| self.get(i) == state).count() as u32
    }
}
