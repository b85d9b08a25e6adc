mod common;

use common::{access, bare_paging, bring_up_small, machine};
use kernel_alloc::{AddressSpace, FaultError, FramePoolError, PagingError, Region, VmPool, VmPoolError};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, VirtualAddress};
use kernel_vmem::{DirectoryIndex, PageEntryBits, PhysMapper, PtEntry, TableIndex};
use std::sync::Arc;

#[test]
fn bad_windows_are_rejected() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = |base: u32, size: u32| {
        VmPool::new(
            VirtualAddress::new(base),
            size,
            Arc::clone(&core.process_pool),
            &core.kernel_space,
        )
        .err()
    };

    assert_eq!(pool(0x6000_0000, 0x800), Some(VmPoolError::TooSmall(0x800)));
    assert_eq!(
        pool(0x6000_0800, 4 * PAGE_SIZE),
        Some(VmPoolError::Unaligned { base: VirtualAddress::new(0x6000_0800), size: 4 * PAGE_SIZE })
    );
    assert_eq!(
        pool(0x6000_0000, PAGE_SIZE + 1),
        Some(VmPoolError::Unaligned { base: VirtualAddress::new(0x6000_0000), size: PAGE_SIZE + 1 })
    );
    // Reaches into the self-map window.
    assert_eq!(
        pool(0xFFB0_0000, 0x20_0000),
        Some(VmPoolError::InvalidRange { base: VirtualAddress::new(0xFFB0_0000), size: 0x20_0000 })
    );
    // Overlaps the shared region.
    assert_eq!(
        pool(0x1000, 4 * PAGE_SIZE),
        Some(VmPoolError::InvalidRange { base: VirtualAddress::new(0x1000), size: 4 * PAGE_SIZE })
    );
    assert!(pool(0xFFBF_F000, PAGE_SIZE).is_none());
}

#[test]
fn regions_are_page_aligned_and_disjoint() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = &core.code_pool;
    let free = pool.free_bytes();

    let sizes = [1, 5000, PAGE_SIZE, 3 * PAGE_SIZE + 1];
    let regions: Vec<Region> = sizes
        .iter()
        .map(|&size| Region::new(pool.allocate(size).unwrap(), size.div_ceil(PAGE_SIZE) * PAGE_SIZE))
        .collect();

    for (i, r) in regions.iter().enumerate() {
        assert!(r.base.is_page_aligned());
        assert!(r.base.as_u32() >= pool.base().as_u32() + PAGE_SIZE);
        assert!(r.base.as_u32() + r.size <= pool.base().as_u32() + pool.size());
        for other in &regions[i + 1..] {
            assert!(r.base.as_u32() + r.size <= other.base.as_u32() || other.base.as_u32() + other.size <= r.base.as_u32());
        }
    }

    let used: u32 = regions.iter().map(|r| r.size).sum();
    assert_eq!(used, 8 * PAGE_SIZE);
    assert_eq!(pool.free_bytes(), free - used);
    assert_eq!(pool.allocated_regions().len(), 1 + sizes.len());
}

#[test]
fn allocation_maps_nothing_until_touched() {
    let m = machine();
    let core = bring_up_small(&m);
    let process_free = core.process_pool.free_frames();

    let va = core.heap_pool.allocate(8 * PAGE_SIZE).unwrap();
    assert_eq!(core.process_pool.free_frames(), process_free);
    assert_eq!(core.kernel_space.translate(va), None);

    access(&m, &core.kernel_space, va + 3 * PAGE_SIZE, true).unwrap();
    assert_eq!(core.process_pool.free_frames(), process_free - 1);
}

#[test]
fn release_unmaps_and_returns_frames() {
    let m = machine();
    let core = bring_up_small(&m);
    let process_free = core.process_pool.free_frames();

    let va = core.heap_pool.allocate(3 * PAGE_SIZE).unwrap();
    for i in 0..3 {
        access(&m, &core.kernel_space, va + i * PAGE_SIZE, true).unwrap();
    }
    assert_eq!(core.process_pool.free_frames(), process_free - 3);

    assert_eq!(core.heap_pool.release(va), Ok(Region::new(va, 3 * PAGE_SIZE)));
    assert_eq!(core.process_pool.free_frames(), process_free);
    assert!(!core.heap_pool.is_legitimate(va));

    let fault = m.touch(va + PAGE_SIZE, false).unwrap_err();
    assert_eq!(
        core.kernel_space.handle_fault(fault),
        Err(FaultError::IllegitimateAccess(va + PAGE_SIZE))
    );
}

#[test]
fn partly_touched_region_releases_cleanly() {
    let m = machine();
    let core = bring_up_small(&m);
    let process_free = core.process_pool.free_frames();

    let va = core.heap_pool.allocate(4 * PAGE_SIZE).unwrap();
    access(&m, &core.kernel_space, va + 2 * PAGE_SIZE, false).unwrap();
    assert!(core.heap_pool.release(va).is_ok());
    assert_eq!(core.process_pool.free_frames(), process_free);
}

#[test]
fn unknown_release_changes_nothing() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = &core.heap_pool;
    let va = pool.allocate(2 * PAGE_SIZE).unwrap();
    access(&m, &core.kernel_space, va, true).unwrap();

    let allocated = pool.allocated_regions();
    let free = pool.free_regions();
    let process_free = core.process_pool.free_frames();

    assert_eq!(pool.release(va + PAGE_SIZE), Err(VmPoolError::UnknownRegion(va + PAGE_SIZE)));
    assert_eq!(pool.release(pool.base()), Err(VmPoolError::UnknownRegion(pool.base())));
    assert_eq!(pool.allocated_regions(), allocated);
    assert_eq!(pool.free_regions(), free);
    assert_eq!(core.process_pool.free_frames(), process_free);
    assert!(pool.is_legitimate(va));
}

#[test]
fn released_range_is_handed_out_again() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = VmPool::new(
        VirtualAddress::new(0x6000_0000),
        4 * PAGE_SIZE,
        Arc::clone(&core.process_pool),
        &core.kernel_space,
    )
    .unwrap();

    let a = pool.allocate(3 * PAGE_SIZE).unwrap();
    assert_eq!(pool.free_bytes(), 0);
    assert_eq!(pool.allocate(1), Err(VmPoolError::OutOfVirtualSpace { requested: PAGE_SIZE }));

    pool.release(a).unwrap();
    assert_eq!(pool.allocate(2 * PAGE_SIZE), Ok(a));
}

#[test]
fn pools_share_one_address_space() {
    let m = machine();
    let core = bring_up_small(&m);
    let code = core.code_pool.allocate(PAGE_SIZE).unwrap();
    let heap = core.heap_pool.allocate(PAGE_SIZE).unwrap();

    assert!(core.kernel_space.is_legitimate(code));
    assert!(core.kernel_space.is_legitimate(heap));
    assert!(!core.code_pool.is_legitimate(heap));

    assert!(m.write_u32(code, 1).is_err());
    access(&m, &core.kernel_space, code, true).unwrap();
    access(&m, &core.kernel_space, heap, true).unwrap();
    m.write_u32(code, 0x1111).unwrap();
    m.write_u32(heap, 0x2222).unwrap();
    assert_eq!(m.read_u32(code), Ok(0x1111));
    assert_eq!(m.read_u32(heap), Ok(0x2222));
}

#[test]
fn construction_faults_in_the_region_lists() {
    let m = machine();
    let core = bring_up_small(&m);
    let kernel_free = core.kernel_pool.free_frames();
    let process_free = core.process_pool.free_frames();

    let base = VirtualAddress::new(0x6000_0000);
    let pool = VmPool::new(base, 16 * PAGE_SIZE, Arc::clone(&core.process_pool), &core.kernel_space).unwrap();

    // A table for the new slot and a frame for the bootstrap page.
    assert_eq!(core.kernel_pool.free_frames(), kernel_free - 1);
    assert_eq!(core.process_pool.free_frames(), process_free - 1);
    assert!(core.kernel_space.translate(base).is_some());

    // Allocated list first, free list in the second half of the page.
    let free_list = base + PAGE_SIZE / 2;
    assert_eq!(m.read_u32(base), Ok(base.as_u32()));
    assert_eq!(m.read_u32(base + 4), Ok(PAGE_SIZE));
    assert_eq!(m.read_u32(free_list), Ok(base.as_u32() + PAGE_SIZE));
    assert_eq!(m.read_u32(free_list + 4), Ok(15 * PAGE_SIZE));

    let va = pool.allocate(2 * PAGE_SIZE).unwrap();
    assert_eq!(m.read_u32(base + 8), Ok(va.as_u32()));
    assert_eq!(m.read_u32(base + 12), Ok(2 * PAGE_SIZE));
    assert_eq!(m.read_u32(free_list + 4), Ok(13 * PAGE_SIZE));
}

#[test]
fn construction_needs_paging_and_a_loaded_space() {
    let m = machine();
    let paging = bare_paging(&m);
    let space = Arc::new(AddressSpace::new(&paging).unwrap());
    let base = VirtualAddress::new(0x6000_0000);
    let frames = Arc::clone(paging.process_pool());

    space.load();
    assert_eq!(
        VmPool::new(base, 4 * PAGE_SIZE, Arc::clone(&frames), &space).err(),
        Some(VmPoolError::Fault(FaultError::PagingDisabled))
    );
    assert!(!space.is_legitimate(base));

    paging.enable().unwrap();
    let other = Arc::new(AddressSpace::new(&paging).unwrap());
    assert_eq!(
        VmPool::new(base, 4 * PAGE_SIZE, Arc::clone(&frames), &other).err(),
        Some(VmPoolError::Fault(FaultError::NotActive))
    );
    assert!(!other.is_legitimate(base));

    assert!(VmPool::new(base, 4 * PAGE_SIZE, frames, &space).is_ok());
}

#[test]
fn many_allocate_release_cycles_keep_working() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = VmPool::new(
        VirtualAddress::new(0x6000_0000),
        16 * 1024 * 1024,
        Arc::clone(&core.process_pool),
        &core.kernel_space,
    )
    .unwrap();
    let process_free = core.process_pool.free_frames();

    for cycle in 0..300u32 {
        let va = pool.allocate(PAGE_SIZE).unwrap();
        access(&m, &core.kernel_space, va, true).unwrap();
        m.write_u32(va, cycle).unwrap();
        assert_eq!(pool.release(va), Ok(Region::new(va, PAGE_SIZE)), "cycle {cycle}");
        assert!(!pool.is_legitimate(va));
    }

    assert_eq!(pool.allocated_regions().len(), 1);
    assert_eq!(pool.free_regions().len(), 1);
    assert_eq!(pool.free_bytes(), pool.size() - PAGE_SIZE);
    assert_eq!(core.process_pool.free_frames(), process_free);
}

#[test]
fn failed_unmap_leaves_region_allocated() {
    let m = machine();
    let core = bring_up_small(&m);
    let pool = &core.heap_pool;
    let va = pool.allocate(2 * PAGE_SIZE).unwrap();
    access(&m, &core.kernel_space, va + PAGE_SIZE, true).unwrap();

    // Back the first page with a frame no pool owns.
    let stray = FrameNumber::new(100);
    unsafe {
        let pd = m.directory_mut(core.kernel_space.directory_frame());
        let table = pd.get(DirectoryIndex::from(va)).next_table().unwrap();
        m.table_mut(table)
            .set(TableIndex::from(va), PtEntry::make_page(stray, PageEntryBits::new_kernel_rw()));
    }
    let free = pool.free_regions();

    assert_eq!(
        pool.release(va),
        Err(VmPoolError::Paging(PagingError::Frames(FramePoolError::InvalidRelease(stray))))
    );
    assert!(pool.is_legitimate(va));
    assert!(pool.allocated_regions().contains(&Region::new(va, 2 * PAGE_SIZE)));
    assert_eq!(pool.free_regions(), free);
    assert!(m.touch(va + PAGE_SIZE, false).is_ok());
}
