//! # Kernel Memory Configuration
//!
//! This crate is the single source of truth for the physical and virtual
//! memory layout the memory-management core is brought up with. Frame pools,
//! the paging system and the kernel's virtual-memory pools all take their
//! placement from here, so the bootstrap code and the tests agree on the same
//! numbers.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Low memory + kernel image      │  identity mapped,
//! 0x0020_0000 ├─────────────────────────────────┤  shared by every
//!             │  Kernel frame pool (2 MiB)      │  address space
//! 0x0040_0000 ├─────────────────────────────────┤ ─ SHARED_SIZE
//!             │  Process frame pool             │
//! 0x00F0_0000 │   ├ memory hole (1 MiB) ───────┤  marked inaccessible
//! 0x0100_0000 │   │                             │
//! 0x0200_0000 └─────────────────────────────────┘
//! ```
//!
//! ## Virtual Memory Layout (kernel address space)
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Shared identity region (4 MiB) │
//! 0x0040_0000 ├─────────────────────────────────┤
//!             │             ...                 │
//! 0x2000_0000 ├─────────────────────────────────┤
//!             │  Kernel code VM pool (256 MiB)  │
//! 0x4000_0000 ├─────────────────────────────────┤
//!             │  Kernel heap VM pool (256 MiB)  │
//! 0x5000_0000 ├─────────────────────────────────┤
//!             │             ...                 │
//! 0xFFC0_0000 ├─────────────────────────────────┤
//!             │  Self-map window (page tables)  │
//! 0xFFFF_F000 │   └ directory window            │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All values are `const` and checked at compile time; [`MemoryLayout`]
//! bundles them so that tests can bring the system up on scaled-down machines.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;

pub use memory::MemoryLayout;
