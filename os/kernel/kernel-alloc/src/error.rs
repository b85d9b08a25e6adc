use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Frame-pool failures.
#[derive(Debug, thiserror::Error, Copy, Clone, PartialEq, Eq)]
pub enum FramePoolError {
    #[error("out of frames: {requested} requested, {free} free")]
    OutOfFrames { requested: u32, free: u32 },
    #[error("frame {0} is not the head of an allocated run")]
    InvalidRelease(FrameNumber),
    #[error("frames {base}+{count} reach outside the pool")]
    OutOfBounds { base: FrameNumber, count: u32 },
    #[error("frame {0} is not free")]
    Unavailable(FrameNumber),
    #[error("zero-length frame request")]
    ZeroLength,
    #[error("a frame pool needs at least one frame")]
    EmptyPool,
    #[error("frames {base}+{count} overlap a registered pool")]
    Overlap { base: FrameNumber, count: u32 },
}

/// Paging-system failures outside the fault path.
#[derive(Debug, thiserror::Error, Copy, Clone, PartialEq, Eq)]
pub enum PagingError {
    #[error("shared region size {0:#x} must be a non-zero page multiple of at most 4 MiB")]
    InvalidSharedSize(u32),
    #[error("kernel pool {base}+{count} is not inside the {shared_size:#x}-byte shared region")]
    KernelPoolNotShared { base: FrameNumber, count: u32, shared_size: u32 },
    #[error("paging enabled without a loaded page directory")]
    NotLoaded,
    #[error(transparent)]
    Frames(#[from] FramePoolError),
}

/// Why a page fault could not be resolved.
#[derive(Debug, thiserror::Error, Copy, Clone, PartialEq, Eq)]
pub enum FaultError {
    #[error("access to {0} outside every registered region")]
    IllegitimateAccess(VirtualAddress),
    #[error("protection violation at {0}")]
    ProtectionViolation(VirtualAddress),
    #[error("page fault with paging disabled")]
    PagingDisabled,
    #[error("page fault delivered to an address space that is not loaded")]
    NotActive,
    #[error("page fault at {0} while page tables were being edited")]
    Reentrant(VirtualAddress),
    #[error(transparent)]
    Frames(#[from] FramePoolError),
}

/// What the top-level fault handler should do about a [`FaultError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultSeverity {
    /// The faulting address space misbehaved or ran out of memory; kill it.
    TerminateAddressSpace,
    /// The kernel's own invariants are broken.
    HaltKernel,
}

impl FaultError {
    #[must_use]
    pub const fn severity(&self) -> FaultSeverity {
        match self {
            Self::IllegitimateAccess(_) | Self::ProtectionViolation(_) | Self::Frames(_) => {
                FaultSeverity::TerminateAddressSpace
            }
            Self::PagingDisabled | Self::NotActive | Self::Reentrant(_) => FaultSeverity::HaltKernel,
        }
    }
}

/// Virtual-memory pool failures.
#[derive(Debug, thiserror::Error, Copy, Clone, PartialEq, Eq)]
pub enum VmPoolError {
    #[error("a pool of {0:#x} bytes cannot hold its bootstrap page")]
    TooSmall(u32),
    #[error("pool base {base} or size {size:#x} is not page aligned")]
    Unaligned { base: VirtualAddress, size: u32 },
    #[error("pool {base}+{size:#x} wraps or reaches into the self-map window")]
    InvalidRange { base: VirtualAddress, size: u32 },
    #[error("zero-size region request")]
    ZeroSize,
    #[error("no free range of {requested:#x} bytes")]
    OutOfVirtualSpace { requested: u32 },
    #[error("region list is full")]
    ListFull,
    #[error("no region starts at {0}")]
    UnknownRegion(VirtualAddress),
    #[error(transparent)]
    Paging(#[from] PagingError),
    #[error(transparent)]
    Fault(#[from] FaultError),
}

/// Bring-up failures.
#[derive(Debug, thiserror::Error, Copy, Clone, PartialEq, Eq)]
pub enum BootError {
    #[error("the memory layout is inconsistent")]
    InvalidLayout,
    #[error(transparent)]
    Frames(#[from] FramePoolError),
    #[error(transparent)]
    Paging(#[from] PagingError),
    #[error(transparent)]
    VmPool(#[from] VmPoolError),
}
