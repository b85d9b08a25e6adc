#![allow(dead_code)]

use kernel_alloc::{AddressSpace, FaultError, FramePoolRegistry, MemoryCore, Paging, bring_up};
use kernel_info::MemoryLayout;
use kernel_info::memory::{FrameRange, VirtualRange};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_vmem::sim::SimulatedMachine;
use std::sync::Arc;

/// 8 MiB machine: kernel pool at 1 MiB, process pool above 2 MiB with a hole at 4 MiB.
pub const SMALL: MemoryLayout = MemoryLayout {
    kernel_pool: FrameRange::new(256, 256),
    process_pool: FrameRange::new(512, 1536),
    memory_hole: Some(FrameRange::new(1024, 64)),
    shared_size: 512 * PAGE_SIZE,
    code_pool: VirtualRange::new(0x2000_0000, 0x10_0000),
    heap_pool: VirtualRange::new(0x4000_0000, 0x10_0000),
};

pub fn machine() -> SimulatedMachine {
    SimulatedMachine::for_layout(&SMALL)
}

pub fn bring_up_small(m: &SimulatedMachine) -> MemoryCore<'_, SimulatedMachine> {
    unsafe { bring_up(m, &SMALL) }.unwrap()
}

/// The SMALL pools and a paging system, with no address space yet.
pub fn bare_paging(m: &SimulatedMachine) -> Arc<Paging<'_, SimulatedMachine>> {
    let registry = Arc::new(FramePoolRegistry::new());
    let kp = SMALL.kernel_pool;
    let pp = SMALL.process_pool;
    let kernel = unsafe { registry.create_pool(m, kp.start, kp.frames, None) }.unwrap();
    let meta = kernel.allocate(1).unwrap();
    let process = unsafe { registry.create_pool(m, pp.start, pp.frames, Some(meta)) }.unwrap();
    Paging::init(m, registry, kernel, process, SMALL.shared_size).unwrap()
}

/// Access `va` the way a kernel thread would: on a page fault, run the
/// handler and retry once.
pub fn access(
    m: &SimulatedMachine,
    space: &AddressSpace<'_, SimulatedMachine>,
    va: VirtualAddress,
    write: bool,
) -> Result<PhysicalAddress, FaultError> {
    match m.touch(va, write) {
        Ok(pa) => Ok(pa),
        Err(fault) => {
            space.handle_fault(fault)?;
            Ok(m.touch(va, write).expect("page is mapped after the fault"))
        }
    }
}
