//! # Memory Layout

use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, VirtualAddress};

const MIB: u32 = 1024 * 1024;

/// First frame of the kernel frame pool (2 MiB).
///
/// Frames below belong to low memory and the kernel image and are never
/// handed out.
pub const KERNEL_POOL_START_FRAME: u32 = (2 * MIB) / PAGE_SIZE;

/// Number of frames in the kernel frame pool (2 MiB worth).
///
/// The kernel pool supplies page-directory and page-table frames, and the
/// metadata frames of other pools.
pub const KERNEL_POOL_SIZE: u32 = (2 * MIB) / PAGE_SIZE;

/// First frame of the process frame pool (4 MiB).
pub const PROCESS_POOL_START_FRAME: u32 = (4 * MIB) / PAGE_SIZE;

/// Number of frames in the process frame pool (28 MiB worth, ending at 32 MiB).
///
/// The process pool backs faulted-in pages of every address space.
pub const PROCESS_POOL_SIZE: u32 = (28 * MIB) / PAGE_SIZE;

/// First frame of the 1 MiB memory hole at 15 MiB.
///
/// The range is part of the process pool's frame numbers but must never be
/// used (legacy ISA hole on the reference machine).
pub const MEM_HOLE_START_FRAME: u32 = (15 * MIB) / PAGE_SIZE;

/// Number of frames in the memory hole.
pub const MEM_HOLE_SIZE: u32 = MIB / PAGE_SIZE;

/// Size of the low region identity-mapped into every address space.
///
/// Covers the kernel image and the kernel frame pool, so that kernel code
/// and page-table frames stay reachable by their physical addresses after
/// paging is enabled. Exactly one page table's worth.
pub const SHARED_SIZE: u32 = 4 * MIB;

/// Base of the kernel code virtual-memory pool (512 MiB).
pub const KERNEL_CODE_POOL_BASE: u32 = 512 * MIB;

/// Size of the kernel code virtual-memory pool.
pub const KERNEL_CODE_POOL_SIZE: u32 = 256 * MIB;

/// Base of the kernel heap virtual-memory pool (1 GiB).
pub const KERNEL_HEAP_POOL_BASE: u32 = 1024 * MIB;

/// Size of the kernel heap virtual-memory pool.
pub const KERNEL_HEAP_POOL_SIZE: u32 = 256 * MIB;

/// Lowest virtual address of the self-map window (directory slot 1023).
///
/// No virtual-memory pool may reach into this range.
pub const SELF_MAP_WINDOW_BASE: u32 = 0xFFC0_0000;

/// A contiguous run of frames.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameRange {
    pub start: FrameNumber,
    pub frames: u32,
}

impl FrameRange {
    #[must_use]
    pub const fn new(start: u32, frames: u32) -> Self {
        Self {
            start: FrameNumber::new(start),
            frames,
        }
    }

    /// One past the last frame of the range.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start.as_u32() + self.frames
    }

    /// Whether `other` lies entirely within this range.
    #[must_use]
    pub const fn covers(&self, other: &Self) -> bool {
        other.start.as_u32() >= self.start.as_u32() && other.end() <= self.end()
    }
}

/// A contiguous range of virtual addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualRange {
    pub base: VirtualAddress,
    pub size: u32,
}

impl VirtualRange {
    #[must_use]
    pub const fn new(base: u32, size: u32) -> Self {
        Self {
            base: VirtualAddress::new(base),
            size,
        }
    }
}

/// Everything the bring-up code needs to know about the machine.
///
/// [`MemoryLayout::BOOT`] is the reference machine; tests construct smaller
/// layouts and check them with [`MemoryLayout::is_consistent`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    /// Frames managed by the kernel pool (self-hosted metadata).
    pub kernel_pool: FrameRange,
    /// Frames managed by the process pool (metadata in the kernel pool).
    pub process_pool: FrameRange,
    /// Frames inside the process pool that must never be handed out.
    pub memory_hole: Option<FrameRange>,
    /// Size of the low region identity-mapped into every address space.
    pub shared_size: u32,
    /// Kernel code virtual-memory pool.
    pub code_pool: VirtualRange,
    /// Kernel heap virtual-memory pool.
    pub heap_pool: VirtualRange,
}

impl MemoryLayout {
    /// The reference machine: 32 MiB of RAM with a hole at 15 MiB.
    pub const BOOT: Self = Self {
        kernel_pool: FrameRange::new(KERNEL_POOL_START_FRAME, KERNEL_POOL_SIZE),
        process_pool: FrameRange::new(PROCESS_POOL_START_FRAME, PROCESS_POOL_SIZE),
        memory_hole: Some(FrameRange::new(MEM_HOLE_START_FRAME, MEM_HOLE_SIZE)),
        shared_size: SHARED_SIZE,
        code_pool: VirtualRange::new(KERNEL_CODE_POOL_BASE, KERNEL_CODE_POOL_SIZE),
        heap_pool: VirtualRange::new(KERNEL_HEAP_POOL_BASE, KERNEL_HEAP_POOL_SIZE),
    };

    /// Total number of physical frames the layout spans (frame 0 up to the end
    /// of the highest pool).
    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        let k = self.kernel_pool.end();
        let p = self.process_pool.end();
        if k > p { k } else { p }
    }

    /// Structural sanity checks: pools don't overlap, the hole lies inside the
    /// process pool, the kernel pool is reachable through the shared identity
    /// region, and the VM pools stay clear of the shared region and the
    /// self-map window.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let k = self.kernel_pool;
        let p = self.process_pool;
        let pools_disjoint = k.end() <= p.start.as_u32() || p.end() <= k.start.as_u32();

        let hole_ok = match self.memory_hole {
            Some(hole) => p.covers(&hole),
            None => true,
        };

        let shared_ok = self.shared_size != 0
            && self.shared_size.is_multiple_of(PAGE_SIZE)
            && self.shared_size <= SHARED_SIZE
            && k.end() <= self.shared_size / PAGE_SIZE;

        pools_disjoint
            && hole_ok
            && shared_ok
            && Self::vm_range_ok(self.code_pool, self.shared_size)
            && Self::vm_range_ok(self.heap_pool, self.shared_size)
    }

    const fn vm_range_ok(range: VirtualRange, shared_size: u32) -> bool {
        let base = range.base.as_u32();
        let Some(end) = base.checked_add(range.size) else {
            return false;
        };
        base >= shared_size
            && base.is_multiple_of(PAGE_SIZE)
            && range.size >= PAGE_SIZE
            && end <= SELF_MAP_WINDOW_BASE
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::BOOT
    }
}

const _: () = {
    assert!(KERNEL_POOL_START_FRAME + KERNEL_POOL_SIZE <= PROCESS_POOL_START_FRAME);
    assert!(MEM_HOLE_START_FRAME >= PROCESS_POOL_START_FRAME);
    assert!(MEM_HOLE_START_FRAME + MEM_HOLE_SIZE <= PROCESS_POOL_START_FRAME + PROCESS_POOL_SIZE);
    assert!(SHARED_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_CODE_POOL_BASE + KERNEL_CODE_POOL_SIZE <= KERNEL_HEAP_POOL_BASE);
    assert!(MemoryLayout::BOOT.is_consistent());
};
