//! # Two-Level Paging Structures
//!
//! A 32-bit virtual address splits into a directory index, a table index and
//! an in-page offset:
//!
//! ```text
//! | 31‒22     | 21‒12     | 11‒0   |
//! | directory |   table   | offset |
//! ```
//!
//! Both levels hold 1024 entries of 4 bytes, so every structure occupies
//! exactly one 4 KiB frame.

pub mod pd;
pub mod pt;

use crate::page_table::pd::DirectoryIndex;
use crate::page_table::pt::TableIndex;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in a directory or a table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual memory covered by one directory entry (4 MiB).
pub const TABLE_SPAN: u32 = 1 << pd::DIRECTORY_SHIFT;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}

/// The page-aligned address selected by a directory and a table index.
#[inline]
#[must_use]
pub const fn join_indices(d: DirectoryIndex, t: TableIndex) -> VirtualAddress {
    VirtualAddress::new((d.as_u32() << pd::DIRECTORY_SHIFT) | (t.as_u32() << pt::TABLE_SHIFT))
}
