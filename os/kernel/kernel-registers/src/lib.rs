//! # Typed IA-32 Control Registers
//!
//! The three control registers the memory-management core touches:
//!
//! - [`Cr0`]: the paging switch (`PG`) and friends,
//! - [`Cr2`]: the faulting linear address after a page fault,
//! - [`Cr3`]: the physical base of the active page directory.
//!
//! The types are plain bit containers and can be built and inspected anywhere.
//! Actually moving them in and out of the CPU requires the `asm` feature and a
//! 32-bit x86 target; everywhere else the register traits are simply not
//! implemented and callers go through a simulated machine instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr0;
mod cr2;
mod cr3;

pub use cr0::Cr0;
pub use cr2::Cr2;
pub use cr3::Cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every subsequent memory access
    /// is translated.
    unsafe fn store_unsafe(self);
}
