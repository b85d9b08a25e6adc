//! # Memory Bring-Up
//!
//! [`bring_up`] builds the whole memory-management core from a
//! [`MemoryLayout`], in the order the pieces depend on each other:
//!
//! 1. kernel frame pool, state table in its own first frame
//! 2. process frame pool, state table in kernel-pool frames
//! 3. memory hole marked inaccessible
//! 4. paging system, kernel address space, load, enable
//! 5. code and heap virtual-memory pools, each faulting in its bootstrap page
//!
//! Anything that fails here leaves the machine unusable; the caller is
//! expected to halt.

use crate::address_space::AddressSpace;
use crate::error::BootError;
use crate::frame_pool::{ContFramePool, FramePoolRegistry};
use crate::paging::Paging;
use crate::vm_pool::VmPool;
use alloc::sync::Arc;
use kernel_info::MemoryLayout;
use kernel_vmem::Mmu;
use log::{error, info};

/// The memory-management core after bring-up.
pub struct MemoryCore<'m, M: Mmu> {
    pub registry: Arc<FramePoolRegistry<'m>>,
    pub kernel_pool: Arc<ContFramePool<'m>>,
    pub process_pool: Arc<ContFramePool<'m>>,
    pub paging: Arc<Paging<'m, M>>,
    pub kernel_space: Arc<AddressSpace<'m, M>>,
    pub code_pool: VmPool<'m, M>,
    pub heap_pool: VmPool<'m, M>,
}

/// Bring up frame pools, paging, and the kernel's virtual-memory pools.
///
/// # Safety
/// Every frame `layout` names must be RAM that nothing else uses, reachable
/// through `mmu`, and the code running this must live in the shared region.
pub unsafe fn bring_up<'m, M: Mmu>(mmu: &'m M, layout: &MemoryLayout) -> Result<MemoryCore<'m, M>, BootError> {
    if !layout.is_consistent() {
        error!("memory layout is inconsistent: {layout:?}");
        return Err(BootError::InvalidLayout);
    }

    let registry = Arc::new(FramePoolRegistry::new());

    let kp = layout.kernel_pool;
    // SAFETY: forwarded to the caller.
    let kernel_pool = unsafe { registry.create_pool(mmu, kp.start, kp.frames, None)? };

    let pp = layout.process_pool;
    let info_frames = kernel_pool.allocate(ContFramePool::metadata_frames_needed(pp.frames))?;
    // SAFETY: the metadata frames were just allocated for this purpose.
    let process_pool = unsafe { registry.create_pool(mmu, pp.start, pp.frames, Some(info_frames))? };

    if let Some(hole) = layout.memory_hole {
        process_pool.mark_inaccessible(hole.start, hole.frames)?;
        info!("memory hole {}+{} marked inaccessible", hole.start, hole.frames);
    }

    let paging = Paging::init(
        mmu,
        Arc::clone(&registry),
        Arc::clone(&kernel_pool),
        Arc::clone(&process_pool),
        layout.shared_size,
    )?;
    let kernel_space = Arc::new(AddressSpace::new(&paging)?);
    kernel_space.load();
    paging.enable()?;

    let code_pool = VmPool::new(
        layout.code_pool.base,
        layout.code_pool.size,
        Arc::clone(&process_pool),
        &kernel_space,
    )?;
    let heap_pool = VmPool::new(
        layout.heap_pool.base,
        layout.heap_pool.size,
        Arc::clone(&process_pool),
        &kernel_space,
    )?;

    info!(
        "memory core up: {} kernel and {} process frames free",
        kernel_pool.free_frames(),
        process_pool.free_frames()
    );

    Ok(MemoryCore {
        registry,
        kernel_pool,
        process_pool,
        paging,
        kernel_space,
        code_pool,
        heap_pool,
    })
}
