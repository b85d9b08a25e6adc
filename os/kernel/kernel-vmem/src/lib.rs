//! # Virtual Memory Support
//!
//! 32-bit x86 two-level paging structures and the hardware seam for the
//! memory-management core.
//!
//! ## What you get
//! - [`PageEntryBits`], the shared 32-bit entry layout, with typed
//!   [`PdEntry`] (directory) and [`PtEntry`] (table) wrappers.
//! - 4 KiB-aligned [`PageDirectory`] / [`PageTable`] frames and the
//!   [`DirectoryIndex`] / [`TableIndex`] index types.
//! - The [`self_map`] window math for the recursive directory slot.
//! - Page-fault decoding: [`PageFault`], [`PageFaultError`].
//! - The [`PhysMapper`] / [`Mmu`] traits, the real MMU ([`X86Mmu`], on
//!   `x86` with the `asm` feature) and a software one (`sim`, feature `sim`).
//!
//! ## 32-bit Virtual Address → Physical Address Walk
//!
//! ```text
//!  CR3 → Page Directory ──PDE──► Page Table ──PTE──► 4 KiB frame
//!        (1024 × 4 B)            (1024 × 4 B)
//!
//!  VA = [directory:10] [table:10] [offset:12]
//! ```
//!
//! One directory covers the full 4 GiB; each present directory entry covers
//! 4 MiB through one page table.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

mod fault;
mod mmu;
mod page_entry_bits;
mod page_table;
pub mod self_map;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use crate::fault::{PageFault, PageFaultError};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::{Mmu, PhysMapper};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdEntry};
pub use crate::page_table::pt::{PageTable, PtEntry, TableIndex};
pub use crate::page_table::{ENTRIES_PER_TABLE, TABLE_SPAN, join_indices, split_indices};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
