//! # Virtual-Memory Pools
//!
//! A [`VmPool`] hands out page-aligned ranges of virtual addresses from a
//! fixed window. It never touches page tables when allocating: the pages of
//! a region are backed lazily, when the first access faults and the address
//! space finds the address inside one of its registered pools.
//!
//! The bookkeeping is two fixed-capacity lists (allocated and free regions)
//! stored in the pool's own first page, the bootstrap page. Entry 0 of the
//! allocated list is that page; it stays allocated for the lifetime of the
//! pool. Until the lists are in place the bootstrap page is the only
//! legitimate address, so the pool can fault in its own storage.
//!
//! ```text
//! base                                                       base + size
//! ┌──────────┬────────┬──────┬────────┬───────────────────────────────┐
//! │bootstrap │ alloc  │ free │ alloc  │             free              │
//! └──────────┴────────┴──────┴────────┴───────────────────────────────┘
//! ```
//!
//! Released regions are merged with the free ranges on either side, so the
//! free list never holds two adjacent entries.

use crate::address_space::AddressSpace;
use crate::error::VmPoolError;
use crate::frame_pool::ContFramePool;
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, PageNumber, VirtualAddress, align_up};
use kernel_sync::SpinLock;
use kernel_vmem::self_map::TABLE_WINDOW;
use kernel_vmem::{Mmu, PageFault, PageFaultError};
use log::{debug, info, warn};

/// Entries per region list; both lists together fill one page.
pub const REGION_LIST_CAPACITY: usize = PAGE_SIZE as usize / (2 * size_of::<Region>());

const _: () = {
    assert!(size_of::<Region>() == 8);
    assert!(size_of::<RegionTable>() == PAGE_SIZE as usize);
};

/// A contiguous range of virtual addresses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Region {
    pub base: VirtualAddress,
    pub size: u32,
}

impl Region {
    #[inline]
    #[must_use]
    pub const fn new(base: VirtualAddress, size: u32) -> Self {
        Self { base, size }
    }

    /// First address past the region.
    #[inline]
    #[must_use]
    pub fn end(&self) -> VirtualAddress {
        self.base + self.size
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        va.as_u32() >= self.base.as_u32() && va.as_u32() - self.base.as_u32() < self.size
    }

    /// The pages the region spans.
    pub fn pages(&self) -> impl Iterator<Item = PageNumber> + use<> {
        let first = self.base.page();
        (0..self.size / PAGE_SIZE).map(move |i| first + i)
    }
}

/// Layout of the bootstrap page.
#[repr(C, align(4096))]
struct RegionTable {
    allocated: [Region; REGION_LIST_CAPACITY],
    free: [Region; REGION_LIST_CAPACITY],
}

/// One list over its slots in the bootstrap page; the length lives outside.
struct RegionList<'m> {
    entries: &'m mut [Region; REGION_LIST_CAPACITY],
    len: usize,
}

impl<'m> RegionList<'m> {
    const fn new(entries: &'m mut [Region; REGION_LIST_CAPACITY]) -> Self {
        Self { entries, len: 0 }
    }

    const fn is_full(&self) -> bool {
        self.len == REGION_LIST_CAPACITY
    }

    fn push(&mut self, region: Region) -> Result<(), VmPoolError> {
        if self.is_full() {
            return Err(VmPoolError::ListFull);
        }
        self.entries[self.len] = region;
        self.len += 1;
        Ok(())
    }

    /// Remove entry `i`, moving the last entry into its place.
    fn swap_remove(&mut self, i: usize) -> Region {
        debug_assert!(i < self.len);
        let region = self.entries[i];
        self.len -= 1;
        self.entries[i] = self.entries[self.len];
        self.entries[self.len] = Region::default();
        region
    }

    fn position(&self, f: impl FnMut(&Region) -> bool) -> Option<usize> {
        self.as_slice().iter().position(f)
    }

    fn as_slice(&self) -> &[Region] {
        &self.entries[..self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [Region] {
        &mut self.entries[..self.len]
    }
}

struct RegionLists<'m> {
    allocated: RegionList<'m>,
    free: RegionList<'m>,
}

/// The region bookkeeping of one pool, shared with the address space that
/// consults it on page faults.
pub struct VmRegions<'m> {
    base: VirtualAddress,
    size: u32,
    /// `None` until the bootstrap page is mapped and the lists are placed in it.
    lists: SpinLock<Option<RegionLists<'m>>>,
}

impl<'m> VmRegions<'m> {
    pub(crate) const fn new(base: VirtualAddress, size: u32) -> Self {
        Self {
            base,
            size,
            lists: SpinLock::new(None),
        }
    }

    /// Seed the lists inside `table`: the bootstrap page allocated, the rest
    /// of the window free.
    fn place(&self, table: &'m mut RegionTable) {
        let RegionTable { allocated, free } = table;
        let mut allocated = RegionList::new(allocated);
        let mut free = RegionList::new(free);
        // Both lists are empty, neither push can fail.
        let _ = allocated.push(self.bootstrap());
        if self.size > PAGE_SIZE {
            let _ = free.push(Region::new(self.base + PAGE_SIZE, self.size - PAGE_SIZE));
        }
        *self.lists.lock() = Some(RegionLists { allocated, free });
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    const fn bootstrap(&self) -> Region {
        Region::new(self.base, PAGE_SIZE)
    }

    /// Whether `va` lies in an allocated region, or in the bootstrap page
    /// while the lists are not in place yet.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> bool {
        match self.lists.lock().as_ref() {
            Some(lists) => lists.allocated.as_slice().iter().any(|r| r.contains(va)),
            None => self.bootstrap().contains(va),
        }
    }

    fn allocate(&self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        if size == 0 {
            return Err(VmPoolError::ZeroSize);
        }
        let Some(size) = align_up(size, PAGE_SIZE) else {
            return Err(VmPoolError::OutOfVirtualSpace { requested: size });
        };

        let mut guard = self.lists.lock();
        let Some(lists) = guard.as_mut() else {
            return Err(VmPoolError::OutOfVirtualSpace { requested: size });
        };
        if lists.allocated.is_full() {
            return Err(VmPoolError::ListFull);
        }
        let Some(i) = lists.free.position(|r| r.size >= size) else {
            return Err(VmPoolError::OutOfVirtualSpace { requested: size });
        };

        let hole = &mut lists.free.as_mut_slice()[i];
        let base = hole.base;
        hole.base += size;
        hole.size -= size;
        if hole.size == 0 {
            lists.free.swap_remove(i);
        }
        lists.allocated.push(Region::new(base, size))?;
        Ok(base)
    }

    /// The allocated region starting at `start`; never the bootstrap page.
    fn find(&self, start: VirtualAddress) -> Result<Region, VmPoolError> {
        self.lists
            .lock()
            .as_ref()
            .and_then(|lists| lists.allocated.as_slice().iter().skip(1).find(|r| r.base == start))
            .copied()
            .ok_or(VmPoolError::UnknownRegion(start))
    }

    /// Move the region starting at `start` from the allocated to the free
    /// list, merging it with the free ranges it touches.
    fn take(&self, start: VirtualAddress) -> Result<Region, VmPoolError> {
        let mut guard = self.lists.lock();
        let Some(lists) = guard.as_mut() else {
            return Err(VmPoolError::UnknownRegion(start));
        };
        let Some(i) = lists.allocated.as_slice().iter().skip(1).position(|r| r.base == start) else {
            return Err(VmPoolError::UnknownRegion(start));
        };

        let region = lists.allocated.as_slice()[i + 1];
        let below = lists.free.position(|r| r.end() == region.base);
        let above = lists.free.position(|r| r.base == region.end());
        if below.is_none() && above.is_none() && lists.free.is_full() {
            return Err(VmPoolError::ListFull);
        }

        lists.allocated.swap_remove(i + 1);
        let mut merged = region;
        if let Some(j) = below {
            let lower = lists.free.swap_remove(j);
            merged = Region::new(lower.base, lower.size + merged.size);
        }
        // The removal above may have moved the upper neighbour.
        if above.is_some()
            && let Some(j) = lists.free.position(|r| r.base == region.end())
        {
            merged.size += lists.free.swap_remove(j).size;
        }
        lists.free.push(merged)?;
        Ok(region)
    }

    fn allocated_regions(&self) -> Vec<Region> {
        match self.lists.lock().as_ref() {
            Some(lists) => lists.allocated.as_slice().to_vec(),
            None => alloc::vec![self.bootstrap()],
        }
    }

    fn free_regions(&self) -> Vec<Region> {
        self.lists
            .lock()
            .as_ref()
            .map(|lists| lists.free.as_slice().to_vec())
            .unwrap_or_default()
    }
}

/// A window of virtual addresses handed out in page-sized regions, backed on
/// demand by the address space's content pool.
pub struct VmPool<'m, M: Mmu> {
    regions: Arc<VmRegions<'m>>,
    /// The pool this window was created for. Faulted-in pages come from the
    /// paging system's content pool; this reference is informational.
    frame_pool: Arc<ContFramePool<'m>>,
    address_space: Arc<AddressSpace<'m, M>>,
}

impl<'m, M: Mmu> VmPool<'m, M> {
    /// Create a pool over `[base, base + size)` and register it with
    /// `address_space`, which must be loaded with paging enabled: the
    /// region lists are written into the bootstrap page, which faults in
    /// through the address space like any other page.
    ///
    /// The window must be page aligned, hold at least the bootstrap page, and
    /// stay clear of both the shared region and the self-map window.
    pub fn new(
        base: VirtualAddress,
        size: u32,
        frame_pool: Arc<ContFramePool<'m>>,
        address_space: &Arc<AddressSpace<'m, M>>,
    ) -> Result<Self, VmPoolError> {
        if size < PAGE_SIZE {
            return Err(VmPoolError::TooSmall(size));
        }
        if !base.is_page_aligned() || !size.is_multiple_of(PAGE_SIZE) {
            return Err(VmPoolError::Unaligned { base, size });
        }
        let in_range = base
            .checked_add(size)
            .is_some_and(|end| end.as_u32() <= TABLE_WINDOW);
        if !in_range || base.as_u32() < address_space.paging().shared_size() {
            return Err(VmPoolError::InvalidRange { base, size });
        }
        if !Arc::ptr_eq(&frame_pool, address_space.paging().process_pool()) {
            warn!(
                "vm pool {base}+{size:#x}: pages come from pool {}, not {}",
                address_space.paging().process_pool().base_frame(),
                frame_pool.base_frame()
            );
        }

        let regions = Arc::new(VmRegions::new(base, size));
        address_space.register_region(&regions);

        let fault = PageFault::new(base, PageFaultError::not_present(true));
        if let Err(e) = address_space.handle_fault(fault) {
            address_space.unregister_region(&regions);
            warn!("vm pool {base}+{size:#x}: bootstrap page: {e}");
            return Err(e.into());
        }
        // SAFETY: the bootstrap page is mapped now and belongs to this pool
        // alone; it stays allocated for as long as the lists live.
        let table: &'m mut RegionTable = unsafe { address_space.paging().mmu().virt_to_mut(base) };
        regions.place(table);
        info!("vm pool {base}+{size:#x}: backed by frame pool {}", frame_pool.base_frame());

        Ok(Self {
            regions,
            frame_pool,
            address_space: Arc::clone(address_space),
        })
    }

    /// Reserve a region of at least `size` bytes, rounded up to whole pages.
    ///
    /// No frames are allocated; the pages fault in on first use.
    pub fn allocate(&self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        let base = self.regions.allocate(size)?;
        debug!("vm pool {}: region at {base} ({size:#x} bytes requested)", self.regions.base());
        Ok(base)
    }

    /// Release the region starting at `start`, unmapping its pages and
    /// returning their frames.
    ///
    /// An address that does not start an allocated region is rejected
    /// without changing anything. The pages are unmapped before the range
    /// goes back on the free list, so a region handed out again always
    /// faults in fresh zero-filled pages.
    pub fn release(&self, start: VirtualAddress) -> Result<Region, VmPoolError> {
        let region = match self.regions.find(start) {
            Ok(region) => region,
            Err(e) => {
                warn!("vm pool {}: release of {start}: {e}", self.regions.base());
                return Err(e);
            }
        };

        let mut freed = 0u32;
        for page in region.pages() {
            if self.address_space.free_page(page)?.is_some() {
                freed += 1;
            }
        }
        let region = self.regions.take(start)?;
        debug!(
            "vm pool {}: released {start}+{:#x}, {freed} frame(s) returned",
            self.regions.base(),
            region.size
        );
        Ok(region)
    }

    /// Whether `va` lies in a region handed out by this pool.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> bool {
        self.regions.is_legitimate(va)
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> VirtualAddress {
        self.regions.base()
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.regions.size()
    }

    #[inline]
    #[must_use]
    pub const fn frame_pool(&self) -> &Arc<ContFramePool<'m>> {
        &self.frame_pool
    }

    #[inline]
    #[must_use]
    pub const fn address_space(&self) -> &Arc<AddressSpace<'m, M>> {
        &self.address_space
    }

    #[inline]
    #[must_use]
    pub const fn regions(&self) -> &Arc<VmRegions<'m>> {
        &self.regions
    }

    /// Snapshot of the allocated list; entry 0 is the bootstrap page.
    #[must_use]
    pub fn allocated_regions(&self) -> Vec<Region> {
        self.regions.allocated_regions()
    }

    #[must_use]
    pub fn free_regions(&self) -> Vec<Region> {
        self.regions.free_regions()
    }

    /// Bytes not covered by any allocated region.
    #[must_use]
    pub fn free_bytes(&self) -> u32 {
        self.free_regions().iter().map(|r| r.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: VirtualAddress = VirtualAddress::new(0x4000_0000);

    fn regions(size: u32) -> VmRegions<'static> {
        let r = VmRegions::new(BASE, size);
        let table = Box::leak(Box::new(RegionTable {
            allocated: [Region::default(); REGION_LIST_CAPACITY],
            free: [Region::default(); REGION_LIST_CAPACITY],
        }));
        r.place(table);
        r
    }

    #[test]
    fn unplaced_lists_vouch_for_bootstrap_page_only() {
        let r = VmRegions::new(BASE, 16 * PAGE_SIZE);
        assert!(r.is_legitimate(BASE));
        assert!(r.is_legitimate(BASE + 0xFFF));
        assert!(!r.is_legitimate(BASE + PAGE_SIZE));
        assert_eq!(r.allocate(1), Err(VmPoolError::OutOfVirtualSpace { requested: PAGE_SIZE }));
        assert_eq!(r.take(BASE + PAGE_SIZE), Err(VmPoolError::UnknownRegion(BASE + PAGE_SIZE)));
    }

    #[test]
    fn lists_live_in_the_bootstrap_page() {
        let r = VmRegions::new(BASE, 8 * PAGE_SIZE);
        let raw = Box::into_raw(Box::new(RegionTable {
            allocated: [Region::default(); REGION_LIST_CAPACITY],
            free: [Region::default(); REGION_LIST_CAPACITY],
        }));
        r.place(unsafe { &mut *raw });
        let a = r.allocate(PAGE_SIZE).unwrap();
        drop(r);

        let table = unsafe { &*raw };
        assert_eq!(table.allocated[0], Region::new(BASE, PAGE_SIZE));
        assert_eq!(table.allocated[1], Region::new(a, PAGE_SIZE));
        assert_eq!(table.free[0], Region::new(BASE + 2 * PAGE_SIZE, 6 * PAGE_SIZE));
    }

    #[test]
    fn fresh_regions_hold_bootstrap_page() {
        let r = regions(16 * PAGE_SIZE);
        assert_eq!(r.allocated_regions(), [Region::new(BASE, PAGE_SIZE)]);
        assert_eq!(r.free_regions(), [Region::new(BASE + PAGE_SIZE, 15 * PAGE_SIZE)]);
        assert!(r.is_legitimate(BASE + 0xFFF));
        assert!(!r.is_legitimate(BASE + PAGE_SIZE));
    }

    #[test]
    fn single_page_pool_has_no_free_space() {
        let r = regions(PAGE_SIZE);
        assert!(r.free_regions().is_empty());
        assert_eq!(r.allocate(1), Err(VmPoolError::OutOfVirtualSpace { requested: PAGE_SIZE }));
    }

    #[test]
    fn allocations_round_up_and_do_not_overlap() {
        let r = regions(16 * PAGE_SIZE);
        let a = r.allocate(1).unwrap();
        let b = r.allocate(PAGE_SIZE + 1).unwrap();
        let c = r.allocate(PAGE_SIZE).unwrap();
        assert_eq!(a, BASE + PAGE_SIZE);
        assert_eq!(b, BASE + 2 * PAGE_SIZE);
        assert_eq!(c, BASE + 4 * PAGE_SIZE);
        assert_eq!(r.allocate(0), Err(VmPoolError::ZeroSize));
        assert!(r.is_legitimate(b + PAGE_SIZE + 0x10));
    }

    #[test]
    fn exhausted_hole_leaves_free_list() {
        let r = regions(3 * PAGE_SIZE);
        r.allocate(2 * PAGE_SIZE).unwrap();
        assert!(r.free_regions().is_empty());
        assert_eq!(r.allocate(1), Err(VmPoolError::OutOfVirtualSpace { requested: PAGE_SIZE }));
    }

    #[test]
    fn take_moves_region_to_free_list() {
        let r = regions(8 * PAGE_SIZE);
        let a = r.allocate(2 * PAGE_SIZE).unwrap();
        let b = r.allocate(PAGE_SIZE).unwrap();
        assert_eq!(r.take(a), Ok(Region::new(a, 2 * PAGE_SIZE)));
        assert!(!r.is_legitimate(a));
        assert!(r.is_legitimate(b));
        assert_eq!(r.allocated_regions(), [Region::new(BASE, PAGE_SIZE), Region::new(b, PAGE_SIZE)]);
        assert!(r.free_regions().contains(&Region::new(a, 2 * PAGE_SIZE)));
    }

    #[test]
    fn unknown_start_changes_nothing() {
        let r = regions(8 * PAGE_SIZE);
        let a = r.allocate(2 * PAGE_SIZE).unwrap();
        let (allocated, free) = (r.allocated_regions(), r.free_regions());
        assert_eq!(r.take(a + PAGE_SIZE), Err(VmPoolError::UnknownRegion(a + PAGE_SIZE)));
        assert_eq!(r.take(BASE), Err(VmPoolError::UnknownRegion(BASE)));
        assert_eq!(r.allocated_regions(), allocated);
        assert_eq!(r.free_regions(), free);
    }

    #[test]
    fn full_allocated_list_refuses_more() {
        let r = regions(1024 * PAGE_SIZE);
        for _ in 1..REGION_LIST_CAPACITY {
            r.allocate(1).unwrap();
        }
        assert_eq!(r.allocate(1), Err(VmPoolError::ListFull));
    }

    #[test]
    fn released_neighbours_merge() {
        let r = regions(8 * PAGE_SIZE);
        let a = r.allocate(PAGE_SIZE).unwrap();
        let b = r.allocate(2 * PAGE_SIZE).unwrap();
        let c = r.allocate(PAGE_SIZE).unwrap();

        r.take(a).unwrap();
        r.take(c).unwrap();
        assert_eq!(r.free_regions().len(), 2);

        // b touches both free ranges: one hole from a to the end of the pool.
        r.take(b).unwrap();
        assert_eq!(r.free_regions(), [Region::new(a, 7 * PAGE_SIZE)]);
        assert_eq!(r.allocate(7 * PAGE_SIZE), Ok(a));
    }

    #[test]
    fn allocate_release_cycles_do_not_fill_the_free_list() {
        let r = regions(4096 * PAGE_SIZE);
        let keep = r.allocate(PAGE_SIZE).unwrap();
        for cycle in 0..512u32 {
            let size = (1 + cycle % 3) * PAGE_SIZE;
            let va = r.allocate(size).unwrap();
            assert_eq!(r.take(va), Ok(Region::new(va, size)), "cycle {cycle}");
            assert_eq!(r.free_regions().len(), 1);
        }
        assert_eq!(r.allocated_regions(), [Region::new(BASE, PAGE_SIZE), Region::new(keep, PAGE_SIZE)]);
        assert_eq!(r.free_regions(), [Region::new(keep + PAGE_SIZE, 4094 * PAGE_SIZE)]);
    }

    #[test]
    fn region_pages() {
        let region = Region::new(BASE, 3 * PAGE_SIZE);
        let pages: Vec<_> = region.pages().collect();
        assert_eq!(pages, [BASE.page(), BASE.page() + 1, BASE.page() + 2]);
        assert!(region.contains(BASE + (3 * PAGE_SIZE - 1)));
        assert!(!region.contains(BASE + 3 * PAGE_SIZE));
    }
}
