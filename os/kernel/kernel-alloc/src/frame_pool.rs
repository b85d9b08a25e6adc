//! # Contiguous Frame Pools
//!
//! A [`ContFramePool`] manages a fixed range of physical frames and hands out
//! physically contiguous runs of them. Its per-frame state table lives in
//! physical memory, either in the first frames of the pool itself or in
//! frames the caller allocated elsewhere (typically from the kernel pool).
//!
//! Pools are created through a [`FramePoolRegistry`], which rejects
//! overlapping ranges and lets a run be released by its first frame number
//! alone, without knowing which pool it came from.

use crate::error::FramePoolError;
use crate::frame_state::{FrameState, FrameStateMap};
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE};
use kernel_sync::SpinLock;
use kernel_vmem::PhysMapper;
use log::{debug, info, trace, warn};

/// A pool of physical frames with first-fit allocation of contiguous runs.
pub struct ContFramePool<'m> {
    base: FrameNumber,
    frame_count: u32,
    metadata: FrameNumber,
    metadata_frames: u32,
    /// The state table occupies the first frames of the pool.
    self_hosted: bool,
    state: SpinLock<PoolState<'m>>,
}

struct PoolState<'m> {
    map: FrameStateMap<'m>,
    free: u32,
}

impl<'m> ContFramePool<'m> {
    /// Frames one metadata frame can describe.
    pub const FRAMES_PER_METADATA_FRAME: u32 = FrameStateMap::FRAMES_PER_BYTE * PAGE_SIZE;

    /// Metadata frames a pool of `n` frames needs for its state table.
    ///
    /// ```rust
    /// # use kernel_alloc::ContFramePool;
    /// assert_eq!(ContFramePool::metadata_frames_needed(1), 1);
    /// assert_eq!(ContFramePool::metadata_frames_needed(16_384), 1);
    /// assert_eq!(ContFramePool::metadata_frames_needed(16_385), 2);
    /// ```
    #[must_use]
    pub const fn metadata_frames_needed(n: u32) -> u32 {
        n.div_ceil(Self::FRAMES_PER_METADATA_FRAME)
    }

    /// Build a pool over `[base, base + n)`.
    ///
    /// Without `metadata` the state table is placed in the pool's first
    /// frames, which are marked as one allocated run. With `metadata`, the
    /// table goes to [`metadata_frames_needed(n)`](Self::metadata_frames_needed)
    /// frames starting there and every pool frame starts out free.
    ///
    /// # Safety
    /// The metadata frames must be RAM reachable through `mapper` for the
    /// pool's whole lifetime and must not be used by anything else.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &M,
        base: FrameNumber,
        n: u32,
        metadata: Option<FrameNumber>,
    ) -> Result<Self, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::EmptyPool);
        }
        if base.checked_add(n).is_none() {
            return Err(FramePoolError::OutOfBounds { base, count: n });
        }

        let needed = Self::metadata_frames_needed(n);
        let self_hosted = metadata.is_none();
        let metadata = metadata.unwrap_or(base);

        // SAFETY: forwarded to the caller.
        let bytes = unsafe { mapper.frames_mut(metadata, needed) };
        let mut map = FrameStateMap::new(bytes, n);
        map.fill(FrameState::Free);

        let mut free = n;
        if self_hosted {
            map.mark_run(0, needed);
            free -= needed;
        }

        info!(
            "frame pool {base}+{n}: {needed} metadata frame(s) at {metadata}{}, {free} free",
            if self_hosted { " (in pool)" } else { "" }
        );

        Ok(Self {
            base,
            frame_count: n,
            metadata,
            metadata_frames: needed,
            self_hosted,
            state: SpinLock::new(PoolState { map, free }),
        })
    }

    /// Allocate `n` contiguous frames and return the first one.
    ///
    /// First fit: scans from the start of the pool and restarts just past
    /// the first busy frame of every candidate run.
    pub fn allocate(&self, n: u32) -> Result<FrameNumber, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::ZeroLength);
        }

        let mut st = self.state.lock();
        if n > st.free {
            return Err(FramePoolError::OutOfFrames { requested: n, free: st.free });
        }

        let mut start = 0;
        while start + n <= self.frame_count {
            match st.map.first_busy(start, n) {
                None => {
                    st.map.mark_run(start, n);
                    st.free -= n;
                    let first = self.base + start;
                    debug!("frame pool {}: allocated {first}+{n}, {} free", self.base, st.free);
                    return Ok(first);
                }
                Some(busy) => start = busy + 1,
            }
        }

        Err(FramePoolError::OutOfFrames { requested: n, free: st.free })
    }

    /// Mark `[first, first + n)` as one allocated run.
    pub fn reserve(&self, first: FrameNumber, n: u32) -> Result<(), FramePoolError> {
        let offset = self.check_range(first, n)?;
        let mut st = self.state.lock();
        if let Some(busy) = st.map.first_busy(offset, n) {
            return Err(FramePoolError::Unavailable(self.base + busy));
        }
        st.map.mark_run(offset, n);
        st.free -= n;
        debug!("frame pool {}: reserved {first}+{n}", self.base);
        Ok(())
    }

    /// Take `[first, first + n)` out of circulation for good.
    pub fn mark_inaccessible(&self, first: FrameNumber, n: u32) -> Result<(), FramePoolError> {
        let offset = self.check_range(first, n)?;
        let mut st = self.state.lock();
        if let Some(busy) = st.map.first_busy(offset, n) {
            return Err(FramePoolError::Unavailable(self.base + busy));
        }
        for i in offset..offset + n {
            st.map.set(i, FrameState::Inaccessible);
        }
        st.free -= n;
        info!("frame pool {}: {first}+{n} inaccessible", self.base);
        Ok(())
    }

    /// Release the run whose first frame is `first`. Returns the number of
    /// frames freed.
    pub fn release_frames(&self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let Some(head) = self.offset_of(first) else {
            return Err(FramePoolError::InvalidRelease(first));
        };
        if self.self_hosted && head == 0 {
            warn!("frame pool {}: refusing to release its own metadata", self.base);
            return Err(FramePoolError::InvalidRelease(first));
        }

        let mut st = self.state.lock();
        if st.map.get(head) != FrameState::HeadOfSequence {
            warn!("frame pool {}: {first} is {:?}, not a run head", self.base, st.map.get(head));
            return Err(FramePoolError::InvalidRelease(first));
        }

        st.map.set(head, FrameState::Free);
        let mut i = head + 1;
        while i < self.frame_count && st.map.get(i) == FrameState::Allocated {
            st.map.set(i, FrameState::Free);
            i += 1;
        }

        let released = i - head;
        st.free += released;
        trace!("frame pool {}: released {first}+{released}", self.base);
        Ok(released)
    }

    #[inline]
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// First metadata frame and how many there are.
    #[inline]
    #[must_use]
    pub const fn metadata(&self) -> (FrameNumber, u32) {
        (self.metadata, self.metadata_frames)
    }

    #[must_use]
    pub fn free_frames(&self) -> u32 {
        self.state.lock().free
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        self.offset_of(frame).is_some()
    }

    /// State of `frame`, or `None` if it lies outside the pool.
    #[must_use]
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        let i = self.offset_of(frame)?;
        Some(self.state.lock().map.get(i))
    }

    /// Whether `[first, first + n)` shares a frame with this pool.
    #[must_use]
    pub const fn overlaps(&self, first: FrameNumber, n: u32) -> bool {
        let a0 = self.base.as_u32() as u64;
        let a1 = a0 + self.frame_count as u64;
        let b0 = first.as_u32() as u64;
        let b1 = b0 + n as u64;
        n != 0 && a0 < b1 && b0 < a1
    }

    const fn offset_of(&self, frame: FrameNumber) -> Option<u32> {
        let f = frame.as_u32();
        let b = self.base.as_u32();
        if f >= b && f - b < self.frame_count {
            Some(f - b)
        } else {
            None
        }
    }

    fn check_range(&self, first: FrameNumber, n: u32) -> Result<u32, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::ZeroLength);
        }
        match self.offset_of(first) {
            Some(offset) if u64::from(offset) + u64::from(n) <= u64::from(self.frame_count) => Ok(offset),
            _ => Err(FramePoolError::OutOfBounds { base: first, count: n }),
        }
    }
}

/// All frame pools of the machine, in creation order.
#[derive(Default)]
pub struct FramePoolRegistry<'m> {
    pools: SpinLock<Vec<Arc<ContFramePool<'m>>>>,
}

impl<'m> FramePoolRegistry<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: SpinLock::new(Vec::new()),
        }
    }

    /// Create a pool over `[base, base + n)` and register it.
    ///
    /// # Safety
    /// See [`ContFramePool::new`].
    pub unsafe fn create_pool<M: PhysMapper>(
        &self,
        mapper: &M,
        base: FrameNumber,
        n: u32,
        metadata: Option<FrameNumber>,
    ) -> Result<Arc<ContFramePool<'m>>, FramePoolError> {
        let mut pools = self.pools.lock();
        if pools.iter().any(|p| p.overlaps(base, n)) {
            return Err(FramePoolError::Overlap { base, count: n });
        }
        // SAFETY: forwarded to the caller.
        let pool = Arc::new(unsafe { ContFramePool::new(mapper, base, n, metadata)? });
        pools.push(Arc::clone(&pool));
        Ok(pool)
    }

    /// Release the run starting at `first`, whichever pool owns it.
    pub fn release(&self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let Some(pool) = self.pool_containing(first) else {
            warn!("release of {first}: no pool owns it");
            return Err(FramePoolError::InvalidRelease(first));
        };
        pool.release_frames(first)
    }

    #[must_use]
    pub fn pool_containing(&self, frame: FrameNumber) -> Option<Arc<ContFramePool<'m>>> {
        self.pools
            .lock()
            .iter()
            .find(|p| p.contains(frame))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
