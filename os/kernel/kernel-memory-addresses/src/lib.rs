//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the 32-bit addresses and frame/page numbers used
//! by the paging and frame-allocation code.
//!
//! ## Overview
//!
//! The machine translates 32-bit virtual addresses through a two-level
//! hierarchy with a fixed 4 KiB granule. Everything above the raw address
//! therefore boils down to four zero-cost newtypes:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | A byte address in some address space. |
//! | [`PhysicalAddress`] | A byte address in physical memory (RAM / MMIO). |
//! | [`PageNumber`] | A virtual address shifted right by [`PAGE_SHIFT`]. |
//! | [`FrameNumber`] | A physical address shifted right by [`PAGE_SHIFT`]. |
//!
//! Frame allocators hand out [`FrameNumber`]s, page-table entries store them in
//! their high-order bits, and region bookkeeping talks in [`VirtualAddress`]es.
//! Keeping the four apart at the type level prevents the classic mix-up of a
//! frame number with a byte address.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x4000_1234);
//! assert_eq!(va.page().base().as_u32(), 0x4000_1000);
//! assert_eq!(va.page_offset(), 0x234);
//!
//! let frame = FrameNumber::new(0x200);
//! assert_eq!(frame.base(), PhysicalAddress::new(0x0020_0000));
//! assert_eq!(PhysicalAddress::new(0x0020_0FFF).frame(), frame);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod frame_number;
mod page_number;
mod physical_address;
mod virtual_address;

pub use crate::frame_number::FrameNumber;
pub use crate::page_number::PageNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;

/// Size of a page (virtual) and a frame (physical) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`, i.e., the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0, 4096), 0);
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two. Returns `None` if the aligned value
/// does not fit into 32 bits.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1, 4096), Some(4096));
/// assert_eq!(align_up(4096, 4096), Some(4096));
/// assert_eq!(align_up(u32::MAX, 4096), None);
/// ```
#[inline]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> Option<u32> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}

/// Number of pages needed to cover `bytes` (rounded up).
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}
