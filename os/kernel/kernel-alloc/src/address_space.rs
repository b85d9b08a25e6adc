//! # Address Space (two-level, self-mapped)
//!
//! One [`AddressSpace`] per address space: a page directory, the first page
//! table (identity map of the shared region), and the list of
//! virtual-memory regions that decide which faults are legitimate.
//!
//! ## Demand paging
//!
//! Nothing outside the shared region is mapped up front. The first access to
//! a page raises a page fault; [`AddressSpace::handle_fault`] checks the
//! address against the registered regions, allocates a page table if the
//! directory slot is empty, then a zero-filled frame for the page.
//!
//! ## Editing structures
//!
//! While the address space is loaded and paging is on, entries are edited
//! through the [`self_map`] window. Otherwise they are reached by physical
//! address, which works because every page-table frame comes from the kernel
//! pool inside the identity-mapped shared region.

use crate::error::{FaultError, PagingError};
use crate::paging::Paging;
use crate::vm_pool::VmRegions;
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PageNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::Cr3;
use kernel_sync::SpinLock;
use kernel_vmem::self_map::{self, SELF_MAP_INDEX};
use kernel_vmem::{
    DirectoryIndex, Mmu, PageEntryBits, PageFault, PageFaultError, PageTable,
    PdEntry, PtEntry, TableIndex, split_indices,
};
use log::{debug, info, trace, warn};

/// How a page fault was resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultResolution {
    /// A fresh zero-filled frame now backs `page`.
    Mapped {
        page: PageNumber,
        frame: FrameNumber,
        /// Page table allocated on the way, if the directory slot was empty.
        new_table: Option<FrameNumber>,
    },
    /// The page was mapped by the time the fault was handled.
    AlreadyMapped,
}

pub struct AddressSpace<'m, M: Mmu> {
    paging: Arc<Paging<'m, M>>,
    directory: FrameNumber,
    regions: SpinLock<Vec<Arc<VmRegions<'m>>>>,
}

impl<'m, M: Mmu> AddressSpace<'m, M> {
    /// Build a fresh address space: a directory with the self-map slot, and
    /// one page table identity mapping the shared region.
    pub fn new(paging: &Arc<Paging<'m, M>>) -> Result<Self, PagingError> {
        let kernel_pool = paging.kernel_pool();
        let directory = kernel_pool.allocate(1)?;
        let table = match kernel_pool.allocate(1) {
            Ok(table) => table,
            Err(e) => {
                kernel_pool.release_frames(directory)?;
                return Err(e.into());
            }
        };

        let _edit = paging.edit_lock();
        let mmu = paging.mmu();
        let shared_pages = paging.shared_size() / PAGE_SIZE;

        // SAFETY: fresh kernel-pool frames, identity mapped; the edit lock is held.
        let pt = unsafe { mmu.table_mut(table) };
        pt.clear();
        for page in 0..shared_pages {
            let entry = PtEntry::make_page(FrameNumber::new(page), PageEntryBits::new_kernel_rw());
            pt.set(TableIndex::from(VirtualAddress::new(page * PAGE_SIZE)), entry);
        }

        // SAFETY: as above.
        let pd = unsafe { mmu.directory_mut(directory) };
        pd.fill(PdEntry::absent());
        pd.set(DirectoryIndex::new(0), PdEntry::make_table(table));
        pd.set(SELF_MAP_INDEX, PdEntry::make_table(directory));

        info!("address space: directory {directory}, shared table {table} ({shared_pages} pages)");

        Ok(Self {
            paging: Arc::clone(paging),
            directory,
            regions: SpinLock::new(Vec::new()),
        })
    }

    /// Make this the current address space (writes CR3).
    pub fn load(&self) {
        self.paging.set_loaded(self.directory);
        // SAFETY: every address space maps the shared region identically, so
        // the kernel keeps running across the switch.
        unsafe { self.paging.mmu().write_cr3(Cr3::from_directory(self.directory)) };
        info!("address space: loaded directory {}", self.directory);
    }

    /// Whether this address space was the last one loaded.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.paging.loaded_directory() == Some(self.directory)
    }

    #[inline]
    #[must_use]
    pub const fn directory_frame(&self) -> FrameNumber {
        self.directory
    }

    #[inline]
    #[must_use]
    pub const fn paging(&self) -> &Arc<Paging<'m, M>> {
        &self.paging
    }

    /// Add `regions` to the set consulted on page faults. Registering the
    /// same regions twice has no effect; returns whether it was added.
    pub fn register_region(&self, regions: &Arc<VmRegions<'m>>) -> bool {
        let mut list = self.regions.lock();
        if list.iter().any(|r| Arc::ptr_eq(r, regions)) {
            return false;
        }
        list.push(Arc::clone(regions));
        debug!(
            "address space {}: region {}+{:#x} registered",
            self.directory,
            regions.base(),
            regions.size()
        );
        true
    }

    /// Drop `regions` from the set consulted on page faults.
    pub(crate) fn unregister_region(&self, regions: &Arc<VmRegions<'m>>) {
        self.regions.lock().retain(|r| !Arc::ptr_eq(r, regions));
    }

    /// Whether some registered region vouches for `va`.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> bool {
        self.regions.lock().iter().any(|r| r.is_legitimate(va))
    }

    /// Resolve a page fault of this (loaded) address space.
    pub fn handle_fault(&self, fault: PageFault) -> Result<FaultResolution, FaultError> {
        let va = fault.address;
        if !self.paging.is_enabled() {
            return Err(FaultError::PagingDisabled);
        }
        if !self.is_active() {
            return Err(FaultError::NotActive);
        }
        if !fault.is_not_present() {
            warn!("{fault}");
            return Err(FaultError::ProtectionViolation(va));
        }
        if self_map::is_in_window(va) || !self.is_legitimate(va) {
            warn!("{fault}: outside every registered region");
            return Err(FaultError::IllegitimateAccess(va));
        }
        let Some(_edit) = self.paging.try_edit_lock() else {
            return Err(FaultError::Reentrant(va));
        };

        let mmu = self.paging.mmu();
        let (d, t) = split_indices(va);

        // SAFETY: loaded with paging on, so the window shows this directory;
        // the edit lock makes this the only reference into it.
        let pde: &mut PdEntry = unsafe { mmu.virt_to_mut(self_map::directory_entry_address(d)) };
        let mut new_table = None;
        if !pde.is_present() {
            let table = self.paging.kernel_pool().allocate(1)?;
            *pde = PdEntry::make_table(table);
            // SAFETY: the entry just written puts the table into the window.
            let pt: &mut PageTable = unsafe { mmu.virt_to_mut(self_map::table_address(d)) };
            pt.clear();
            debug!("{va}: page table {table} for slot {}", d.as_usize());
            new_table = Some(table);
        }

        // SAFETY: the directory slot is present now.
        let pte: &mut PtEntry = unsafe { mmu.virt_to_mut(self_map::table_entry_address(d, t)) };
        if pte.is_present() {
            debug!("{va}: already mapped");
            return Ok(FaultResolution::AlreadyMapped);
        }

        let frame = self.paging.process_pool().allocate(1)?;
        *pte = PtEntry::make_page(frame, PageEntryBits::new_kernel_rw());

        let page = va.page();
        // SAFETY: mapped just now; nobody else knows about this frame yet.
        let bytes: &mut [u8; PAGE_SIZE as usize] = unsafe { mmu.virt_to_mut(page.base()) };
        bytes.fill(0);

        debug!("{va}: page {page} backed by frame {frame}");
        Ok(FaultResolution::Mapped {
            page,
            frame,
            new_table,
        })
    }

    /// Resolve the fault the CPU just reported: address from CR2, `error_code`
    /// as pushed on the stack.
    pub fn handle_current_fault(&self, error_code: u32) -> Result<FaultResolution, FaultError> {
        let address = self.paging.mmu().read_cr2().fault_address();
        self.handle_fault(PageFault::new(address, PageFaultError::from_bits(error_code)))
    }

    /// Unmap `page` and return its frame to the pool it came from.
    ///
    /// Pages that are not mapped, and pages of the shared region or the
    /// self-map window, are left alone (`Ok(None)`).
    pub fn free_page(&self, page: PageNumber) -> Result<Option<FrameNumber>, PagingError> {
        let va = page.base();
        if va.as_u32() < self.paging.shared_size() || self_map::is_in_window(va) {
            warn!("address space {}: refusing to free {page}", self.directory);
            return Ok(None);
        }

        let mmu = self.paging.mmu();
        let (d, t) = split_indices(va);
        let active = self.is_active();
        let _edit = self.paging.edit_lock();

        let pte: &mut PtEntry = if active && self.paging.is_enabled() {
            // SAFETY: loaded with paging on; the edit lock is held.
            let pde: &mut PdEntry = unsafe { mmu.virt_to_mut(self_map::directory_entry_address(d)) };
            if !pde.is_present() {
                return Ok(None);
            }
            // SAFETY: the directory slot is present.
            unsafe { mmu.virt_to_mut(self_map::table_entry_address(d, t)) }
        } else {
            // SAFETY: directory and tables are identity-mapped kernel-pool frames.
            let pd = unsafe { mmu.directory_mut(self.directory) };
            let Some(table) = pd.get(d).next_table() else {
                return Ok(None);
            };
            // SAFETY: as above.
            let pt = unsafe { mmu.table_mut(table) };
            pt.entry_mut(t)
        };

        let Some(frame) = pte.page() else {
            return Ok(None);
        };
        self.paging.registry().release(frame)?;
        *pte = pte.unmapped();

        if active {
            // SAFETY: same directory, just flushing stale translations.
            unsafe { mmu.reload_cr3() };
        }
        trace!("address space {}: freed {page} (frame {frame})", self.directory);
        Ok(Some(frame))
    }

    /// Physical address `va` translates to in this address space, if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let mmu = self.paging.mmu();
        let (d, t) = split_indices(va);
        let _edit = self.paging.edit_lock();

        // SAFETY: identity-mapped kernel-pool frames; the edit lock is held.
        let pd = unsafe { mmu.directory_mut(self.directory) };
        let table = pd.get(d).next_table()?;
        // SAFETY: as above.
        let pt = unsafe { mmu.table_mut(table) };
        let frame = pt.get(t).page()?;
        Some(frame.base() + va.page_offset())
    }
}
