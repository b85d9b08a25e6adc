//! # Recursive (Self-Referencing) Directory Slot
//!
//! Directory slot [`SELF_MAP_INDEX`] points at the directory itself. Through
//! that one entry the CPU treats the directory as a page table, and every
//! page table as an ordinary page. The paging structures of the *active*
//! address space therefore appear at fixed virtual addresses:
//!
//! ```text
//! 0xFFC0_0000 ┌───────────────────────────┐ TABLE_WINDOW
//!             │ table 0                   │
//! 0xFFC0_1000 ├───────────────────────────┤
//!             │ table 1                   │
//!             │ ...                       │
//! 0xFFFF_F000 ├───────────────────────────┤ DIRECTORY_WINDOW
//!             │ the directory (table 1023)│
//! 0xFFFF_FFFF └───────────────────────────┘
//! ```
//!
//! - Entry `t` of table `d` sits at `0xFFC0_0000 | d << 12 | t << 2`.
//! - Directory entry `d` sits at `0xFFFF_F000 | d << 2`.
//!
//! The window reaches only the structures of whatever directory CR3 holds.
//! Code editing an inactive address space has to go through physical
//! addresses instead.

use crate::page_table::pd::{DIRECTORY_SHIFT, DirectoryIndex};
use crate::page_table::pt::{TABLE_SHIFT, TableIndex};
use kernel_memory_addresses::VirtualAddress;

/// The directory slot that refers back to the directory.
pub const SELF_MAP_INDEX: DirectoryIndex = DirectoryIndex::new(1023);

/// Virtual base of the table window (`SELF_MAP_INDEX << 22`).
pub const TABLE_WINDOW: u32 = SELF_MAP_INDEX.as_u32() << DIRECTORY_SHIFT;

/// Virtual address of the directory itself.
pub const DIRECTORY_WINDOW: u32 = TABLE_WINDOW | (SELF_MAP_INDEX.as_u32() << TABLE_SHIFT);

const ENTRY_SHIFT: u32 = 2;

const _: () = {
    assert!(TABLE_WINDOW == 0xFFC0_0000);
    assert!(DIRECTORY_WINDOW == 0xFFFF_F000);
    assert!(TABLE_WINDOW == kernel_info::memory::SELF_MAP_WINDOW_BASE);
};

/// Where directory entry `d` of the active directory is visible.
#[inline]
#[must_use]
pub const fn directory_entry_address(d: DirectoryIndex) -> VirtualAddress {
    VirtualAddress::new(DIRECTORY_WINDOW | (d.as_u32() << ENTRY_SHIFT))
}

/// Where the page table installed in directory slot `d` is visible.
#[inline]
#[must_use]
pub const fn table_address(d: DirectoryIndex) -> VirtualAddress {
    VirtualAddress::new(TABLE_WINDOW | (d.as_u32() << TABLE_SHIFT))
}

/// Where entry `t` of the page table in directory slot `d` is visible.
#[inline]
#[must_use]
pub const fn table_entry_address(d: DirectoryIndex, t: TableIndex) -> VirtualAddress {
    VirtualAddress::new(TABLE_WINDOW | (d.as_u32() << TABLE_SHIFT) | (t.as_u32() << ENTRY_SHIFT))
}

/// Whether `va` lies in the window, i.e. is translated through the self-map
/// slot rather than a regular page table.
#[inline]
#[must_use]
pub const fn is_in_window(va: VirtualAddress) -> bool {
    va.as_u32() >= TABLE_WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::split_indices;

    #[test]
    fn reference_addresses() {
        let d = DirectoryIndex::new(0x100);
        let t = TableIndex::new(0x123);
        assert_eq!(directory_entry_address(d).as_u32(), 0xFFFF_F400);
        assert_eq!(table_address(d).as_u32(), 0xFFD0_0000);
        assert_eq!(table_entry_address(d, t).as_u32(), 0xFFD0_048C);
    }

    #[test]
    fn directory_is_table_1023() {
        for d in 0..1024u16 {
            let d = DirectoryIndex::new(d);
            assert_eq!(
                directory_entry_address(d),
                table_entry_address(SELF_MAP_INDEX, TableIndex::new(d.as_usize() as u16))
            );
        }
        assert_eq!(table_address(SELF_MAP_INDEX).as_u32(), DIRECTORY_WINDOW);
    }

    /// Every (directory, table) pair lands on a distinct, 4-byte aligned slot
    /// inside the window that the CPU resolves through slot 1023 first and
    /// slot `d` second.
    #[test]
    fn window_arithmetic_is_exhaustively_consistent() {
        for d in 0..1024u16 {
            let di = DirectoryIndex::new(d);
            let table = table_address(di);
            assert!(is_in_window(table));
            assert_eq!(table.page_offset(), 0);

            for t in 0..1024u16 {
                let ti = TableIndex::new(t);
                let va = table_entry_address(di, ti);

                let (outer, inner) = split_indices(va);
                assert_eq!(outer, SELF_MAP_INDEX);
                assert_eq!(inner.as_usize(), d as usize);
                assert_eq!(va.page_offset(), u32::from(t) * 4);
                assert_eq!(va.page(), table.page());
            }
        }
    }

    #[test]
    fn window_boundary() {
        assert!(!is_in_window(VirtualAddress::new(TABLE_WINDOW - 1)));
        assert!(is_in_window(VirtualAddress::new(TABLE_WINDOW)));
        assert!(is_in_window(VirtualAddress::new(u32::MAX)));
    }
}
