//! # Kernel Memory Management Core
//!
//! Physical frame allocation, demand-paged address translation, and
//! virtual-memory region tracking for the 32-bit kernel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 VmPool (per window)                 │
//! │    • page-aligned regions, first fit                │
//! │    • vouches for faulting addresses                 │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ register / free_page
//! ┌─────────────────▼───────────────────────────────────┐
//! │           AddressSpace  +  Paging                   │
//! │    • directory with self-map slot 1023              │
//! │    • shared region identity mapped                  │
//! │    • page-fault handler: table, frame, zero fill    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ allocate / release
//! ┌─────────────────▼───────────────────────────────────┐
//! │      ContFramePool  +  FramePoolRegistry            │
//! │    • contiguous runs, 2 bits of state per frame     │
//! │    • release by first frame, any pool               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! ### Frame pools ([`frame_pool`])
//!
//! A [`ContFramePool`] owns a fixed range of frames and hands out physically
//! contiguous runs. Its state table is packed at four frames per byte and
//! lives either in the pool's first frames or in frames from another pool.
//! The [`FramePoolRegistry`] knows every pool, so a run can be released by its
//! first frame number alone.
//!
//! ### Paging ([`paging`], [`address_space`])
//!
//! [`Paging`] holds what all address spaces share: the MMU, the kernel pool
//! for page tables, the process pool for pages, and the size of the shared
//! region. An [`AddressSpace`] is one page directory. Its last slot points at
//! the directory itself, so once paging is on every directory and table entry
//! has a fixed virtual address and can be edited without a physical mapping.
//!
//! ### Virtual-memory pools ([`vm_pool`])
//!
//! A [`VmPool`] reserves page-aligned regions from a window of virtual
//! addresses. Reserving costs nothing; frames are allocated by the fault
//! handler on first touch and returned when the region is released. The
//! pool's region lists live in the first page of its own window.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FaultResolution, bring_up};
//! use kernel_info::MemoryLayout;
//! use kernel_vmem::sim::SimulatedMachine;
//!
//! let layout = MemoryLayout::BOOT;
//! let machine = SimulatedMachine::for_layout(&layout);
//! let core = unsafe { bring_up(&machine, &layout) }.unwrap();
//!
//! let va = core.heap_pool.allocate(3 * 4096).unwrap();
//! let fault = machine.touch(va, true).unwrap_err();
//! let resolved = core.kernel_space.handle_fault(fault).unwrap();
//! assert!(matches!(resolved, FaultResolution::Mapped { .. }));
//! assert!(machine.touch(va, true).is_ok());
//! ```
//!
//! ## Concurrency
//!
//! Frame-pool state, the pool registry, region lists, and page-table edits
//! each sit behind a [`SpinLock`](kernel_sync::SpinLock). A page fault raised
//! while page tables are being edited is reported as
//! [`FaultError::Reentrant`] instead of deadlocking.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod address_space;
pub mod boot;
pub mod error;
pub mod frame_pool;
pub mod frame_state;
pub mod paging;
pub mod vm_pool;

pub use crate::address_space::{AddressSpace, FaultResolution};
pub use crate::boot::{MemoryCore, bring_up};
pub use crate::error::{BootError, FaultError, FaultSeverity, FramePoolError, PagingError, VmPoolError};
pub use crate::frame_pool::{ContFramePool, FramePoolRegistry};
pub use crate::frame_state::FrameState;
pub use crate::paging::Paging;
pub use crate::vm_pool::{REGION_LIST_CAPACITY, Region, VmPool, VmRegions};
