mod common;

use common::{access, bare_paging, bring_up_small, machine};
use kernel_alloc::{AddressSpace, FaultError, FaultResolution, FramePoolRegistry, Paging, PagingError};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, VirtualAddress};
use kernel_vmem::self_map::{DIRECTORY_WINDOW, TABLE_WINDOW};
use kernel_vmem::{Mmu, PageFault, PageFaultError, PhysMapper};
use std::sync::Arc;

#[test]
fn first_touch_maps_a_zeroed_frame() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(PAGE_SIZE).unwrap();

    // Leave garbage in the frame the fault will get.
    let next = core.process_pool.allocate(1).unwrap();
    core.process_pool.release_frames(next).unwrap();
    m.write_phys_u32(next.base() + 8, 0xDEAD_BEEF);

    let kernel_free = core.kernel_pool.free_frames();
    let process_free = core.process_pool.free_frames();

    let fault = m.touch(va + 8, false).unwrap_err();
    assert!(fault.is_not_present());
    assert_eq!(fault.address, va + 8);

    let resolved = core.kernel_space.handle_fault(fault).unwrap();
    let FaultResolution::Mapped { page, frame, new_table } = resolved else {
        panic!("expected a fresh mapping, got {resolved:?}");
    };
    assert_eq!(page, va.page());
    assert_eq!(frame, next);
    // The heap's bootstrap page brought in the table for this slot.
    assert_eq!(new_table, None);

    assert_eq!(core.kernel_pool.free_frames(), kernel_free);
    assert_eq!(core.process_pool.free_frames(), process_free - 1);
    assert_eq!(m.read_u32(va + 8), Ok(0));
    assert_eq!(core.kernel_space.translate(va + 8), Some(frame.base() + 8));
}

#[test]
fn neighbouring_page_reuses_the_table() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(2 * PAGE_SIZE).unwrap();

    access(&m, &core.kernel_space, va, true).unwrap();
    let kernel_free = core.kernel_pool.free_frames();

    let fault = m.touch(va + PAGE_SIZE, true).unwrap_err();
    let resolved = core.kernel_space.handle_fault(fault).unwrap();
    assert!(matches!(resolved, FaultResolution::Mapped { new_table: None, .. }));
    assert_eq!(core.kernel_pool.free_frames(), kernel_free);
}

#[test]
fn mapped_page_does_not_fault_again() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(PAGE_SIZE).unwrap();

    let fault = m.touch(va, true).unwrap_err();
    core.kernel_space.handle_fault(fault).unwrap();
    let faults = m.faults();
    let process_free = core.process_pool.free_frames();

    m.write_u32(va + 0x100, 7).unwrap();
    assert_eq!(m.read_u32(va + 0x100), Ok(7));
    assert_eq!(m.faults(), faults);

    // A stale fault for a page that is mapped by now changes nothing.
    assert_eq!(core.kernel_space.handle_fault(fault), Ok(FaultResolution::AlreadyMapped));
    assert_eq!(core.process_pool.free_frames(), process_free);
}

#[test]
fn current_fault_is_read_from_cr2() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.code_pool.allocate(PAGE_SIZE).unwrap();

    let fault = m.touch(va + 0x44, true).unwrap_err();
    assert_eq!(m.read_cr2().fault_address(), va + 0x44);
    let resolved = core.kernel_space.handle_current_fault(fault.error.into_bits()).unwrap();
    assert!(matches!(resolved, FaultResolution::Mapped { page, .. } if page == va.page()));
}

#[test]
fn bootstrap_page_is_mapped_and_legitimate() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.base();
    let faults = m.faults();
    assert!(core.kernel_space.is_legitimate(va));
    assert!(m.touch(va + 0x800, false).is_ok());
    assert_eq!(m.faults(), faults);
}

#[test]
fn illegitimate_address_gets_no_frame() {
    let m = machine();
    let core = bring_up_small(&m);
    let kernel_free = core.kernel_pool.free_frames();
    let process_free = core.process_pool.free_frames();

    let stray = VirtualAddress::new(0x8000_0000);
    let fault = m.touch(stray, true).unwrap_err();
    assert_eq!(core.kernel_space.handle_fault(fault), Err(FaultError::IllegitimateAccess(stray)));

    // Inside the pool window, outside every region.
    let unreserved = core.heap_pool.base() + 16 * PAGE_SIZE;
    let fault = m.touch(unreserved, false).unwrap_err();
    assert_eq!(
        core.kernel_space.handle_fault(fault),
        Err(FaultError::IllegitimateAccess(unreserved))
    );

    let window = VirtualAddress::new(TABLE_WINDOW + 300 * PAGE_SIZE);
    let fault = PageFault::new(window, PageFaultError::not_present(false));
    assert_eq!(core.kernel_space.handle_fault(fault), Err(FaultError::IllegitimateAccess(window)));

    assert_eq!(core.kernel_pool.free_frames(), kernel_free);
    assert_eq!(core.process_pool.free_frames(), process_free);
}

#[test]
fn protection_fault_is_not_resolved() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(PAGE_SIZE).unwrap();
    let fault = PageFault::new(va, PageFaultError::protection(true));
    assert_eq!(core.kernel_space.handle_fault(fault), Err(FaultError::ProtectionViolation(va)));
}

#[test]
fn self_map_window_shows_the_directory() {
    let m = machine();
    let core = bring_up_small(&m);
    let dir = core.kernel_space.directory_frame();

    let last = VirtualAddress::new(DIRECTORY_WINDOW + 1023 * 4);
    let entry = m.read_u32(last).unwrap();
    assert_eq!(entry & !0xFFF, dir.base().as_u32());
    assert_eq!(entry, m.read_phys_u32(dir.base() + 1023 * 4));

    // Slot 0 holds the shared-region table, whose entry 1 maps frame 1.
    let pte = m.read_u32(VirtualAddress::new(TABLE_WINDOW + 4)).unwrap();
    assert_eq!(pte & !0xFFF, PAGE_SIZE);
    assert_eq!(pte & 0b11, 0b11);
}

#[test]
fn free_page_returns_the_frame_and_flushes() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(PAGE_SIZE).unwrap();
    let process_free = core.process_pool.free_frames();

    let fault = m.touch(va, true).unwrap_err();
    let Ok(FaultResolution::Mapped { frame, .. }) = core.kernel_space.handle_fault(fault) else {
        panic!("fault was not resolved");
    };
    assert_eq!(core.process_pool.free_frames(), process_free - 1);

    let flushes = m.cr3_writes();
    assert_eq!(core.kernel_space.free_page(va.page()), Ok(Some(frame)));
    assert_eq!(m.cr3_writes(), flushes + 1);
    assert_eq!(core.process_pool.free_frames(), process_free);
    assert_eq!(core.kernel_space.translate(va), None);
    assert!(m.touch(va, false).is_err());

    // Freeing an unmapped page is a no-op.
    assert_eq!(core.kernel_space.free_page(va.page()), Ok(None));
    assert_eq!(m.cr3_writes(), flushes + 1);
}

#[test]
fn reused_frame_is_zeroed_again() {
    let m = machine();
    let core = bring_up_small(&m);
    let va = core.heap_pool.allocate(PAGE_SIZE).unwrap();

    access(&m, &core.kernel_space, va, true).unwrap();
    m.write_u32(va + 0x20, 0xCAFE_F00D).unwrap();
    let first = core.kernel_space.free_page(va.page()).unwrap().unwrap();

    let fault = m.touch(va + 0x20, false).unwrap_err();
    let Ok(FaultResolution::Mapped { frame, .. }) = core.kernel_space.handle_fault(fault) else {
        panic!("fault was not resolved");
    };
    assert_eq!(frame, first);
    assert_eq!(m.read_u32(va + 0x20), Ok(0));
}

#[test]
fn shared_region_pages_are_never_freed() {
    let m = machine();
    let core = bring_up_small(&m);
    let kernel_free = core.kernel_pool.free_frames();
    let page = VirtualAddress::new(300 * PAGE_SIZE).page();
    assert_eq!(core.kernel_space.free_page(page), Ok(None));
    assert_eq!(core.kernel_pool.free_frames(), kernel_free);
    assert!(m.touch(page.base(), false).is_ok());
}

#[test]
fn enable_requires_a_loaded_directory() {
    let m = machine();
    let paging = bare_paging(&m);
    assert_eq!(paging.enable(), Err(PagingError::NotLoaded));
    assert!(!paging.is_enabled());

    let space = AddressSpace::new(&paging).unwrap();
    assert_eq!(paging.enable(), Err(PagingError::NotLoaded));

    space.load();
    assert!(space.is_active());
    assert_eq!(paging.loaded_directory(), Some(space.directory_frame()));
    assert_eq!(paging.enable(), Ok(()));
    assert!(paging.is_enabled());
    assert!(m.read_cr0().pg_paging());
    assert_eq!(m.read_cr3().directory(), space.directory_frame());
}

#[test]
fn faults_before_paging_or_on_inactive_space() {
    let m = machine();
    let paging = bare_paging(&m);
    let a = AddressSpace::new(&paging).unwrap();
    let b = AddressSpace::new(&paging).unwrap();
    let fault = PageFault::new(VirtualAddress::new(0x4000_0000), PageFaultError::not_present(true));

    a.load();
    assert_eq!(a.handle_fault(fault), Err(FaultError::PagingDisabled));

    paging.enable().unwrap();
    assert!(!b.is_active());
    assert_eq!(b.handle_fault(fault), Err(FaultError::NotActive));
}

#[test]
fn shared_size_is_validated() {
    let m = machine();
    for bad in [0, PAGE_SIZE + 1, 8 * 1024 * 1024] {
        let registry = Arc::new(FramePoolRegistry::new());
        let kernel = unsafe { registry.create_pool(&m, FrameNumber::new(256), 256, None) }.unwrap();
        let meta = kernel.allocate(1).unwrap();
        let process = unsafe { registry.create_pool(&m, FrameNumber::new(512), 64, Some(meta)) }.unwrap();
        assert_eq!(
            Paging::init(&m, registry, kernel, process, bad).err(),
            Some(PagingError::InvalidSharedSize(bad))
        );
    }
}

#[test]
fn kernel_pool_must_lie_in_the_shared_region() {
    let m = machine();
    let pools = || {
        let registry = Arc::new(FramePoolRegistry::new());
        let kernel = unsafe { registry.create_pool(&m, FrameNumber::new(128), 64, None) }.unwrap();
        let meta = kernel.allocate(1).unwrap();
        let process = unsafe { registry.create_pool(&m, FrameNumber::new(512), 64, Some(meta)) }.unwrap();
        (registry, kernel, process)
    };

    let (registry, kernel, process) = pools();
    assert_eq!(
        Paging::init(&m, registry, kernel, process, 191 * PAGE_SIZE).err(),
        Some(PagingError::KernelPoolNotShared {
            base: FrameNumber::new(128),
            count: 64,
            shared_size: 191 * PAGE_SIZE
        })
    );

    let (registry, kernel, process) = pools();
    assert!(Paging::init(&m, registry, kernel, process, 192 * PAGE_SIZE).is_ok());
}

#[test]
fn inactive_space_is_edited_through_physical_frames() {
    let m = machine();
    let core = bring_up_small(&m);
    let other = AddressSpace::new(&core.paging).unwrap();

    // Install a mapping by hand into the inactive space, then free it.
    let frame = core.process_pool.allocate(1).unwrap();
    let table = core.kernel_pool.allocate(1).unwrap();
    let va = VirtualAddress::new(0x4000_3000);
    unsafe {
        let pd = m.directory_mut(other.directory_frame());
        pd.set(kernel_vmem::DirectoryIndex::from(va), kernel_vmem::PdEntry::make_table(table));
        let pt = m.table_mut(table);
        pt.clear();
        pt.set(
            kernel_vmem::TableIndex::from(va),
            kernel_vmem::PtEntry::make_page(frame, kernel_vmem::PageEntryBits::new_kernel_rw()),
        );
    }
    assert_eq!(other.translate(va + 4), Some(frame.base() + 4));

    let flushes = m.cr3_writes();
    let process_free = core.process_pool.free_frames();
    assert_eq!(other.free_page(va.page()), Ok(Some(frame)));
    assert_eq!(m.cr3_writes(), flushes);
    assert_eq!(core.process_pool.free_frames(), process_free + 1);
    assert_eq!(other.translate(va), None);
}
