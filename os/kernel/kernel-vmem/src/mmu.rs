//! # Hardware Seam
//!
//! Everything the memory-management core needs from the machine goes through
//! two traits:
//!
//! - [`PhysMapper`] turns a physical address into a usable reference. On the
//!   real machine the shared low region is identity mapped in every address
//!   space, so frames from the kernel pool are reachable by their physical
//!   address whether paging is on or off.
//! - [`Mmu`] adds the control registers and access through the *current*
//!   virtual address space (the self-map window, freshly faulted pages).
//!
//! [`X86Mmu`] drives the real registers; the `sim` module provides a
//! software machine with the same semantics for tests.

use crate::{PageDirectory, PageTable};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_registers::{Cr0, Cr2, Cr3};

/// Converts physical addresses to usable references.
///
/// # Safety
/// - `pa` must be backed by RAM reachable without going through a mapping
///   that may disappear (identity-mapped shared region, or paging disabled).
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` and no other live reference may
///   alias them mutably.
pub trait PhysMapper {
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// The `count` contiguous frames starting at `first`, as bytes.
    ///
    /// # Safety
    /// As for [`phys_to_mut`](Self::phys_to_mut), for the whole range.
    unsafe fn frames_mut<'a>(&self, first: FrameNumber, count: u32) -> &'a mut [u8] {
        let bytes = count as usize * PAGE_SIZE as usize;
        unsafe {
            let start: &mut u8 = self.phys_to_mut(first.base());
            core::slice::from_raw_parts_mut(core::ptr::from_mut(start), bytes)
        }
    }

    /// Borrow the [`PageDirectory`] stored in `frame`.
    ///
    /// # Safety
    /// `frame` must hold a page directory; see [`phys_to_mut`](Self::phys_to_mut).
    #[inline]
    unsafe fn directory_mut<'a>(&self, frame: FrameNumber) -> &'a mut PageDirectory {
        unsafe { self.phys_to_mut(frame.base()) }
    }

    /// Borrow the [`PageTable`] stored in `frame`.
    ///
    /// # Safety
    /// `frame` must hold a page table; see [`phys_to_mut`](Self::phys_to_mut).
    #[inline]
    unsafe fn table_mut<'a>(&self, frame: FrameNumber) -> &'a mut PageTable {
        unsafe { self.phys_to_mut(frame.base()) }
    }
}

/// Control registers plus access through the current translation.
///
/// Register writes are `unsafe`: loading CR3 or flipping CR0.PG changes how
/// every following access is translated, including the caller's own code.
pub trait Mmu: PhysMapper {
    fn read_cr0(&self) -> Cr0;

    /// # Safety
    /// The new value must keep the executing code and stack mapped.
    unsafe fn write_cr0(&self, cr0: Cr0);

    /// The address of the most recent page fault.
    fn read_cr2(&self) -> Cr2;

    fn read_cr3(&self) -> Cr3;

    /// # Safety
    /// The directory must map the executing code and stack. Also flushes
    /// every non-global translation.
    unsafe fn write_cr3(&self, cr3: Cr3);

    /// Reference to `va` in the current address space.
    ///
    /// # Safety
    /// `va` must be mapped (or the caller must be prepared for the fault the
    /// access raises), `T` must not straddle a page boundary, and no other
    /// live reference may alias the target mutably.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;

    #[inline]
    fn paging_enabled(&self) -> bool {
        self.read_cr0().pg_paging()
    }

    /// Flush the whole TLB by writing CR3 back.
    ///
    /// # Safety
    /// Same as [`write_cr3`](Self::write_cr3); the value written is the
    /// current one.
    #[inline]
    unsafe fn reload_cr3(&self) {
        unsafe { self.write_cr3(self.read_cr3()) }
    }
}

/// The real MMU of a 32-bit x86 CPU.
///
/// Physical addresses are used as pointers directly: the kernel runs with
/// the shared low region identity mapped, and page-table frames come from
/// that region.
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub struct X86Mmu {
    _private: (),
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl X86Mmu {
    /// # Safety
    /// Must run at CPL0, and physical frames passed to
    /// [`PhysMapper::phys_to_mut`] must be identity mapped.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl PhysMapper for X86Mmu {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_u32() as usize as *mut T;
        // SAFETY: identity mapping of the shared region (see `new`).
        unsafe { &mut *ptr }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Mmu for X86Mmu {
    fn read_cr0(&self) -> Cr0 {
        use kernel_registers::LoadRegisterUnsafe;
        // SAFETY: CPL0 (see `new`).
        unsafe { Cr0::load_unsafe() }
    }

    unsafe fn write_cr0(&self, cr0: Cr0) {
        use kernel_registers::StoreRegisterUnsafe;
        unsafe { cr0.store_unsafe() }
    }

    fn read_cr2(&self) -> Cr2 {
        use kernel_registers::LoadRegisterUnsafe;
        // SAFETY: CPL0 (see `new`).
        unsafe { Cr2::load_unsafe() }
    }

    fn read_cr3(&self) -> Cr3 {
        use kernel_registers::LoadRegisterUnsafe;
        // SAFETY: CPL0 (see `new`).
        unsafe { Cr3::load_unsafe() }
    }

    unsafe fn write_cr3(&self, cr3: Cr3) {
        use kernel_registers::StoreRegisterUnsafe;
        unsafe { cr3.store_unsafe() }
    }

    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let ptr = va.as_u32() as usize as *mut T;
        unsafe { &mut *ptr }
    }
}
