//! # Kernel synchronization primitives
//!
//! The memory-management core is shared between the page-fault path and
//! whoever allocates or releases memory. Every piece of mutable bookkeeping
//! (frame bitmaps, the pool registry, region lists, page-table edits) sits
//! behind a [`SpinLock`]. The machine has no scheduler yet, so busy-waiting is
//! the only option; critical sections are short and never block.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
