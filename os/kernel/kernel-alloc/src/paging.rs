//! # Paging System State
//!
//! [`Paging`] is the machine-wide half of the translator: the MMU, the two
//! frame pools page tables and pages are drawn from, which directory is
//! loaded, and the lock that serializes every edit of a paging structure.
//! Each [`AddressSpace`](crate::AddressSpace) holds an `Arc` to it.
//!
//! The lifecycle is strictly ordered:
//!
//! ```text
//! Paging::init ─► AddressSpace::new ─► AddressSpace::load ─► Paging::enable
//! ```

use crate::error::PagingError;
use crate::frame_pool::{ContFramePool, FramePoolRegistry};
use alloc::sync::Arc;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE};
use kernel_sync::{SpinLock, SpinLockGuard};
use kernel_vmem::{Mmu, TABLE_SPAN};
use log::{debug, info};

pub struct Paging<'m, M: Mmu> {
    mmu: &'m M,
    registry: Arc<FramePoolRegistry<'m>>,
    /// Page directories and page tables.
    kernel_pool: Arc<ContFramePool<'m>>,
    /// Frames backing faulted-in pages.
    process_pool: Arc<ContFramePool<'m>>,
    shared_size: u32,
    loaded: SpinLock<Option<FrameNumber>>,
    edit: SpinLock<()>,
}

impl<'m, M: Mmu> Paging<'m, M> {
    /// Set up the paging system.
    ///
    /// `shared_size` bytes from address 0 are identity mapped into every
    /// address space; they must fit into the first page table and must
    /// cover the kernel pool so that page-table frames stay reachable by
    /// their physical address.
    pub fn init(
        mmu: &'m M,
        registry: Arc<FramePoolRegistry<'m>>,
        kernel_pool: Arc<ContFramePool<'m>>,
        process_pool: Arc<ContFramePool<'m>>,
        shared_size: u32,
    ) -> Result<Arc<Self>, PagingError> {
        if shared_size == 0 || !shared_size.is_multiple_of(PAGE_SIZE) || shared_size > TABLE_SPAN {
            return Err(PagingError::InvalidSharedSize(shared_size));
        }
        let kernel_end = kernel_pool.base_frame().as_u32() + kernel_pool.frame_count();
        if kernel_end > shared_size / PAGE_SIZE {
            return Err(PagingError::KernelPoolNotShared {
                base: kernel_pool.base_frame(),
                count: kernel_pool.frame_count(),
                shared_size,
            });
        }

        info!(
            "paging: tables from pool {}, pages from pool {}, {} KiB shared",
            kernel_pool.base_frame(),
            process_pool.base_frame(),
            shared_size / 1024
        );

        Ok(Arc::new(Self {
            mmu,
            registry,
            kernel_pool,
            process_pool,
            shared_size,
            loaded: SpinLock::new(None),
            edit: SpinLock::new(()),
        }))
    }

    /// Turn on address translation.
    ///
    /// Requires that an address space was loaded and that CR3 still holds
    /// its directory.
    pub fn enable(&self) -> Result<(), PagingError> {
        let Some(directory) = self.loaded_directory() else {
            return Err(PagingError::NotLoaded);
        };
        if self.mmu.read_cr3().directory() != directory {
            return Err(PagingError::NotLoaded);
        }
        if self.is_enabled() {
            debug!("paging: already enabled");
            return Ok(());
        }

        // SAFETY: the loaded directory identity maps the shared region, which
        // holds the kernel image, so execution continues at the same address.
        unsafe { self.mmu.write_cr0(self.mmu.read_cr0().with_pg_paging(true)) };
        info!("paging: enabled with directory {directory}");
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.mmu.paging_enabled()
    }

    /// Directory frame of the address space loaded last.
    #[must_use]
    pub fn loaded_directory(&self) -> Option<FrameNumber> {
        *self.loaded.lock()
    }

    pub(crate) fn set_loaded(&self, directory: FrameNumber) {
        *self.loaded.lock() = Some(directory);
    }

    #[inline]
    #[must_use]
    pub const fn mmu(&self) -> &'m M {
        self.mmu
    }

    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &Arc<FramePoolRegistry<'m>> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub const fn kernel_pool(&self) -> &Arc<ContFramePool<'m>> {
        &self.kernel_pool
    }

    #[inline]
    #[must_use]
    pub const fn process_pool(&self) -> &Arc<ContFramePool<'m>> {
        &self.process_pool
    }

    #[inline]
    #[must_use]
    pub const fn shared_size(&self) -> u32 {
        self.shared_size
    }

    pub(crate) fn edit_lock(&self) -> SpinLockGuard<'_, ()> {
        self.edit.lock()
    }

    /// The edit lock, unless it is already held: a page fault raised while
    /// a paging structure is being edited must not spin on it.
    pub(crate) fn try_edit_lock(&self) -> Option<SpinLockGuard<'_, ()>> {
        self.edit.try_lock()
    }
}
