//! # Page Directory (upper level)
//!
//! - [`DirectoryIndex`]: index type for VA bits `[31:22]`.
//! - [`PdEntry`]: a directory entry (PDE). Large pages are not used, so a
//!   present PDE always points at a [`PageTable`](crate::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PDEs, referenced by CR3.

use crate::PageEntryBits;
use crate::page_table::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Shift that extracts the directory index from an address.
pub const DIRECTORY_SHIFT: u32 = 22;

/// Index into the page directory (VA bits `[31:22]`).
///
/// Range is `0..1024` (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

impl DirectoryIndex {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> DIRECTORY_SHIFT) & 0x3FF) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

/// A single page-directory entry.
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

impl PdEntry {
    /// All-zero entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Not present, writable: how unused directory slots start out.
    #[inline]
    #[must_use]
    pub const fn absent() -> Self {
        Self(PageEntryBits::new_absent_rw())
    }

    /// Present, writable, supervisor entry pointing at the table in `table`.
    #[inline]
    #[must_use]
    pub const fn make_table(table: FrameNumber) -> Self {
        Self(PageEntryBits::new_kernel_rw().with_frame_number(table))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// The next-level table, if present.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(self.0.frame_number())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    /// Every slot [`PdEntry::absent`].
    #[inline]
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            entries: [PdEntry::absent(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Changing a live entry requires a TLB flush by the caller.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn entry_mut(&mut self, i: DirectoryIndex) -> &mut PdEntry {
        &mut self.entries[i.as_usize()]
    }

    /// Overwrite every slot with `e`.
    #[inline]
    pub fn fill(&mut self, e: PdEntry) {
        self.entries.fill(e);
    }
}

const _: () = assert!(size_of::<PageDirectory>() == 4096);
