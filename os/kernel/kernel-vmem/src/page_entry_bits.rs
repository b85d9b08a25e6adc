use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

/// A single 32-bit paging-structure entry in its raw bitfield form.
///
/// Directory entries (PDEs) and table entries (PTEs) share this layout under
/// 32-bit paging without PSE; only the meaning of the frame differs (next
/// table versus mapped page). The typed wrappers [`PdEntry`](crate::PdEntry)
/// and [`PtEntry`](crate::PtEntry) decide which.
///
/// ### Bit layout
///
/// | Bits  | Name  | Meaning |
/// |-------|-------|---------|
/// | 0     | `P`   | Present |
/// | 1     | `RW`  | Writable |
/// | 2     | `US`  | User-mode accessible |
/// | 3     | `PWT` | Write-through caching |
/// | 4     | `PCD` | Cache disabled |
/// | 5     | `A`   | Accessed (set by the CPU) |
/// | 6     | `D`   | Dirty (PTE only, set by the CPU) |
/// | 7     | `PS`  | Large page (PDE only, unused here) |
/// | 8     | `G`   | Global |
/// | 9–11  | AVL   | Free for OS use |
/// | 12–31 | frame | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::FrameNumber;
/// let e = PageEntryBits::new_kernel_rw().with_frame_number(FrameNumber::new(0x400));
/// assert_eq!(e.into_bits(), 0x0040_0003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear means any access through this entry raises a page fault; the
    /// remaining bits are then free for software use.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU whenever the entry is used for a translation.
    pub accessed: bool,

    /// Dirty (D, bit 6).
    ///
    /// Set by the CPU on the first write through a table entry.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// Would select a 4 MiB page in a directory entry. Large pages are not
    /// used; every entry built here keeps it clear.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    /// Available to software (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame: u32,
}

impl PageEntryBits {
    /// Present and writable, supervisor only.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Not present but writable.
    ///
    /// The initial value of every unused directory slot, so that a later
    /// fault only has to fill in the frame and flip `present`.
    #[inline]
    #[must_use]
    pub const fn new_absent_rw() -> Self {
        Self::new().with_writable(true)
    }

    /// The frame this entry points at.
    #[inline]
    #[must_use]
    pub const fn frame_number(&self) -> FrameNumber {
        FrameNumber::new(self.frame())
    }

    /// Physical base address of [`frame_number`](Self::frame_number).
    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.frame_number().base()
    }

    #[inline]
    pub const fn set_frame_number(&mut self, frame: FrameNumber) {
        self.set_frame(frame.as_u32());
    }

    #[inline]
    #[must_use]
    pub const fn with_frame_number(self, frame: FrameNumber) -> Self {
        self.with_frame(frame.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lives_in_the_high_bits() {
        let e = PageEntryBits::new().with_frame_number(FrameNumber::new(0xF_FFFF));
        assert_eq!(e.into_bits(), 0xFFFF_F000);
        assert!(!e.present());
    }

    #[test]
    fn flags_and_frame_are_independent() {
        let e = PageEntryBits::from_bits(0x0020_1063);
        assert!(e.present());
        assert!(e.writable());
        assert!(e.accessed());
        assert!(e.dirty());
        assert!(!e.user());
        assert_eq!(e.frame_number(), FrameNumber::new(0x201));
        assert_eq!(e.physical_address().as_u32(), 0x0020_1000);
    }

    #[test]
    fn absent_writable_matches_unused_slot_encoding() {
        assert_eq!(PageEntryBits::new_absent_rw().into_bits(), 0x2);
        assert_eq!(PageEntryBits::new_kernel_rw().into_bits(), 0x3);
    }
}
