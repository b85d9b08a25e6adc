//! # Simulated MMU
//!
//! A software model of a single 32-bit x86 CPU with two-level paging, used to
//! run the memory-management core in ordinary test processes.
//!
//! - RAM is a boxed slice of 4 KiB-aligned frames; physical address `pa`
//!   is byte `pa` of that slice.
//! - With CR0.PG clear, virtual addresses are physical addresses.
//! - With CR0.PG set, every access walks the directory in CR3 exactly like
//!   the hardware does: directory entry, table entry, offset. Accessed and
//!   dirty bits are updated. The self-map slot needs no special casing; it
//!   falls out of the walk.
//! - A failed walk latches the address in CR2 and returns a [`PageFault`]
//!   with an x86 error code. Nothing is cached, so there is no TLB to flush;
//!   CR3 writes are counted instead so tests can observe flushes.
//!
//! Kernel-side code that dereferences an unmapped address through
//! [`Mmu::virt_to_mut`] has no handler to return to. The simulation panics,
//! which is the test-harness equivalent of a triple fault.

use crate::page_table::split_indices;
use crate::{Mmu, PageEntryBits, PageFault, PageFaultError, PhysMapper};
use alloc::boxed::Box;
use core::cell::{Cell, UnsafeCell};
use kernel_info::MemoryLayout;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_registers::{Cr0, Cr2, Cr3};
use log::trace;

const FRAME_BYTES: usize = PAGE_SIZE as usize;

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; FRAME_BYTES]>);

impl Frame {
    const fn zeroed() -> Self {
        Self(UnsafeCell::new([0; FRAME_BYTES]))
    }
}

/// Simulated RAM plus control registers.
///
/// Single CPU: the type is deliberately not `Sync`.
pub struct SimulatedMachine {
    ram: Box<[Frame]>,
    cr0: Cell<Cr0>,
    cr2: Cell<Cr2>,
    cr3: Cell<Cr3>,
    cr3_writes: Cell<usize>,
    faults: Cell<usize>,
}

impl SimulatedMachine {
    /// A machine with `frames` frames of zeroed RAM, in protected mode with
    /// paging disabled.
    #[must_use]
    pub fn new(frames: u32) -> Self {
        let ram = core::iter::repeat_with(Frame::zeroed)
            .take(frames as usize)
            .collect::<Box<[Frame]>>();
        Self {
            ram,
            cr0: Cell::new(Cr0::new().with_pe_protection_enable(true)),
            cr2: Cell::new(Cr2::default()),
            cr3: Cell::new(Cr3::new()),
            cr3_writes: Cell::new(0),
            faults: Cell::new(0),
        }
    }

    /// A machine with exactly as much RAM as `layout` describes.
    #[must_use]
    pub fn for_layout(layout: &MemoryLayout) -> Self {
        Self::new(layout.total_frames())
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn frame_count(&self) -> u32 {
        // Built from a `u32` frame count.
        self.ram.len() as u32
    }

    /// How often CR3 was written (loads and flushes).
    #[must_use]
    pub fn cr3_writes(&self) -> usize {
        self.cr3_writes.get()
    }

    /// How many accesses through [`touch`](Self::touch) faulted.
    #[must_use]
    pub fn faults(&self) -> usize {
        self.faults.get()
    }

    /// Perform one access to `va` as the CPU would.
    ///
    /// Returns the physical address the access reached, or the page fault it
    /// raised (with CR2 updated).
    pub fn touch(&self, va: VirtualAddress, write: bool) -> Result<PhysicalAddress, PageFault> {
        self.walk(va, write).map_err(|error| {
            self.cr2.set(Cr2::from_bits(va.as_u32()));
            self.faults.set(self.faults.get() + 1);
            let fault = PageFault::new(va, error);
            trace!("sim: {fault}");
            fault
        })
    }

    /// Read the aligned word at `va`.
    pub fn read_u32(&self, va: VirtualAddress) -> Result<u32, PageFault> {
        let pa = self.touch(va, false)?;
        Ok(self.read_phys_u32(pa))
    }

    /// Write the aligned word at `va`.
    pub fn write_u32(&self, va: VirtualAddress, value: u32) -> Result<(), PageFault> {
        let pa = self.touch(va, true)?;
        self.write_phys_u32(pa, value);
        Ok(())
    }

    /// Read the aligned word at physical address `pa`, bypassing translation.
    #[must_use]
    pub fn read_phys_u32(&self, pa: PhysicalAddress) -> u32 {
        assert!(pa.as_u32().is_multiple_of(4), "unaligned word access at {pa:?}");
        // SAFETY: in bounds (checked by `byte_ptr`) and aligned; the simulation
        // hands out no references that outlive this call.
        unsafe { self.byte_ptr(pa).cast::<u32>().read() }
    }

    pub fn write_phys_u32(&self, pa: PhysicalAddress, value: u32) {
        assert!(pa.as_u32().is_multiple_of(4), "unaligned word access at {pa:?}");
        // SAFETY: see `read_phys_u32`.
        unsafe { self.byte_ptr(pa).cast::<u32>().write(value) }
    }

    /// Whether every byte of `frame` is zero.
    #[must_use]
    pub fn frame_is_zeroed(&self, frame: FrameNumber) -> bool {
        let ptr = self.byte_ptr(frame.base());
        // SAFETY: a whole frame starting at a frame base stays inside `ram`.
        let bytes = unsafe { core::slice::from_raw_parts(ptr, FRAME_BYTES) };
        bytes.iter().all(|&b| b == 0)
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let frame = pa.frame().as_usize();
        assert!(
            frame < self.ram.len(),
            "{pa:?} beyond simulated RAM of {} frames",
            self.ram.len()
        );
        // SAFETY: offset is below FRAME_BYTES.
        unsafe {
            self.ram[frame]
                .0
                .get()
                .cast::<u8>()
                .add(pa.frame_offset() as usize)
        }
    }

    fn entry(&self, table: FrameNumber, index: u32) -> PageEntryBits {
        let pa = table.base() + index * 4;
        PageEntryBits::from_bits(self.read_phys_u32(pa))
    }

    fn set_entry(&self, table: FrameNumber, index: u32, e: PageEntryBits) {
        let pa = table.base() + index * 4;
        self.write_phys_u32(pa, e.into_bits());
    }

    fn walk(&self, va: VirtualAddress, write: bool) -> Result<PhysicalAddress, PageFaultError> {
        if !self.cr0.get().pg_paging() {
            return Ok(PhysicalAddress::new(va.as_u32()));
        }

        let (d, t) = split_indices(va);
        let directory = self.cr3.get().directory();

        let pde = self.entry(directory, d.as_u32());
        if !pde.present() {
            return Err(PageFaultError::not_present(write));
        }

        let table = pde.frame_number();
        let pte = self.entry(table, t.as_u32());
        if !pte.present() {
            return Err(PageFaultError::not_present(write));
        }

        let writable = pde.writable() && pte.writable();
        if write && !writable && self.cr0.get().wp_write_protect() {
            return Err(PageFaultError::protection(write));
        }

        self.set_entry(directory, d.as_u32(), pde.with_accessed(true));
        let pte = self.entry(table, t.as_u32());
        self.set_entry(
            table,
            t.as_u32(),
            pte.with_accessed(true).with_dirty(pte.dirty() || write),
        );

        Ok(pte.physical_address() + va.page_offset())
    }
}

impl PhysMapper for SimulatedMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = pa.frame_offset() as usize;
        assert!(
            offset + size_of::<T>() <= FRAME_BYTES,
            "{pa:?} does not hold a {}-byte object",
            size_of::<T>()
        );
        debug_assert!(offset.is_multiple_of(align_of::<T>()));
        // SAFETY: in bounds and aligned; exclusivity is the caller's contract.
        unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
    }

    unsafe fn frames_mut<'a>(&self, first: FrameNumber, count: u32) -> &'a mut [u8] {
        let end = first.as_usize() + count as usize;
        assert!(
            end <= self.ram.len(),
            "frames {first:?}+{count} beyond simulated RAM of {} frames",
            self.ram.len()
        );
        // SAFETY: `ram` is one contiguous allocation of whole frames.
        unsafe { core::slice::from_raw_parts_mut(self.byte_ptr(first.base()), count as usize * FRAME_BYTES) }
    }
}

impl Mmu for SimulatedMachine {
    fn read_cr0(&self) -> Cr0 {
        self.cr0.get()
    }

    unsafe fn write_cr0(&self, cr0: Cr0) {
        self.cr0.set(cr0);
    }

    fn read_cr2(&self) -> Cr2 {
        self.cr2.get()
    }

    fn read_cr3(&self) -> Cr3 {
        self.cr3.get()
    }

    unsafe fn write_cr3(&self, cr3: Cr3) {
        self.cr3.set(cr3);
        self.cr3_writes.set(self.cr3_writes.get() + 1);
    }

    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = match self.walk(va, true) {
            Ok(pa) => pa,
            Err(error) => {
                self.cr2.set(Cr2::from_bits(va.as_u32()));
                panic!("unhandled kernel {}", PageFault::new(va, error));
            }
        };
        unsafe { self.phys_to_mut(pa) }
    }
}
