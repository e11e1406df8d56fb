//! Pool memory resource
//!
//! A coalescing suballocator that carves a pool of device memory obtained
//! from an upstream resource. The pool grows geometrically on demand, backs
//! off exponentially when upstream refuses, and never exceeds the configured
//! maximum. Freed memory is recycled across streams through the
//! stream-ordered event protocol.

use std::collections::BTreeSet;
use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

use crate::error::{PoolError, PoolResult};
use crate::mr::block::Block;
use crate::mr::free_list::CoalescingFreeList;
use crate::mr::resource::DeviceMemoryResource;
use crate::mr::stream_ordered::{SplitBlock, StreamOrderedHeap, SuballocatorPolicy};
use crate::mr::{align_down, align_up, is_aligned, ALLOCATION_ALIGNMENT};
use crate::runtime::{AcceleratorRuntime, StreamHandle};

/// Pool sizing configuration.
///
/// All sizes are optional: an unset initial size targets half the device's
/// free memory, an unset maximum leaves growth unbounded, and an unset
/// allocation cap accepts any representable size. Configured pool sizes must
/// be multiples of [`ALLOCATION_ALIGNMENT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolConfig {
    initial_pool_size: Option<usize>,
    maximum_pool_size: Option<usize>,
    max_allocation_size: Option<usize>,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial pool size in bytes.
    pub fn with_initial_pool_size(mut self, bytes: usize) -> Self {
        self.initial_pool_size = Some(bytes);
        self
    }

    /// Set the hard ceiling on the total pool size in bytes.
    pub fn with_maximum_pool_size(mut self, bytes: usize) -> Self {
        self.maximum_pool_size = Some(bytes);
        self
    }

    /// Set the largest single allocation the pool accepts, in bytes.
    pub fn with_max_allocation_size(mut self, bytes: usize) -> Self {
        self.max_allocation_size = Some(bytes);
        self
    }
}

/// Growth policy and upstream ledger.
struct PoolPlan<'up> {
    upstream: &'up dyn DeviceMemoryResource,
    current_pool_size: usize,
    maximum_pool_size: Option<usize>,
    max_allocation_size: usize,
    /// Head blocks obtained from upstream, tagged with their exact sizes.
    upstream_blocks: BTreeSet<Block>,
    #[cfg(feature = "track-allocations")]
    allocated_blocks: BTreeSet<Block>,
}

impl<'up> PoolPlan<'up> {
    /// Size to request from upstream for a demand of `size` bytes.
    ///
    /// With a maximum configured, grow by at least half the remaining
    /// headroom; zero means the request can never be satisfied. Without one,
    /// double the pool (or jump straight to `size` when it is larger).
    fn size_to_grow(&self, size: usize) -> usize {
        if let Some(maximum) = self.maximum_pool_size {
            let remaining = align_up(
                maximum.saturating_sub(self.current_pool_size),
                ALLOCATION_ALIGNMENT,
            );
            let aligned = align_up(size, ALLOCATION_ALIGNMENT);
            if aligned <= remaining {
                aligned.max(remaining / 2)
            } else {
                0
            }
        } else {
            size.max(self.current_pool_size)
        }
    }

    /// Request `try_size` bytes from upstream, halving toward `min_size` on
    /// failure. The first success is entered into the ledger.
    fn try_to_expand(
        &mut self,
        mut try_size: usize,
        min_size: usize,
        stream: StreamHandle,
    ) -> PoolResult<Block> {
        while try_size >= min_size {
            if let Some(block) = self.block_from_upstream(try_size, stream) {
                self.current_pool_size += block.size();
                return Ok(block);
            }
            if try_size == min_size {
                break;
            }
            try_size = min_size.max(try_size / 2);
        }
        tracing::error!(
            stream = ?stream,
            bytes = min_size,
            "pool growth failed: upstream refused the minimum expansion"
        );
        Err(PoolError::OutOfMemory(format!(
            "maximum pool size exceeded growing by {} bytes",
            min_size
        )))
    }

    /// One upstream allocation attempt. Failure reports `None` so the caller
    /// can back off.
    fn block_from_upstream(&mut self, size: usize, stream: StreamHandle) -> Option<Block> {
        if size == 0 {
            return None;
        }
        tracing::debug!(stream = ?stream, bytes = size, "requesting upstream block");
        match self.upstream.allocate(size, stream) {
            Ok(ptr) => {
                let block = Block::new(ptr, size, true);
                self.upstream_blocks.insert(block);
                Some(block)
            }
            Err(err) => {
                tracing::debug!(bytes = size, error = %err, "upstream allocation failed, backing off");
                None
            }
        }
    }

    /// Return every ledger entry to upstream and reset the counters.
    fn release(&mut self) {
        for block in std::mem::take(&mut self.upstream_blocks) {
            self.upstream
                .deallocate(block.pointer(), block.size(), StreamHandle::DEFAULT);
        }
        #[cfg(feature = "track-allocations")]
        self.allocated_blocks.clear();
        self.current_pool_size = 0;
    }
}

impl SuballocatorPolicy for PoolPlan<'_> {
    fn max_allocation_size(&self) -> usize {
        self.max_allocation_size
    }

    fn expand_pool(
        &mut self,
        size: usize,
        _blocks: &mut CoalescingFreeList,
        stream: StreamHandle,
    ) -> PoolResult<Block> {
        self.try_to_expand(self.size_to_grow(size), size, stream)
    }

    fn allocate_from_block(&mut self, block: Block, size: usize) -> SplitBlock {
        let (allocated, remainder) = block.split(size);
        #[cfg(feature = "track-allocations")]
        self.allocated_blocks.insert(allocated);
        SplitBlock {
            allocated,
            remainder,
        }
    }

    fn free_block(&mut self, ptr: *mut c_void, size: usize) -> Block {
        #[cfg(feature = "track-allocations")]
        {
            let recorded = self.allocated_blocks.take(&Block::probe(ptr));
            debug_assert!(
                recorded.is_some(),
                "deallocate of untracked pointer {:?}",
                ptr
            );
            if let Some(recorded) = recorded {
                debug_assert_eq!(
                    recorded.size(),
                    size,
                    "deallocate size mismatch for {:?}",
                    ptr
                );
                return recorded;
            }
        }
        let is_head = self.upstream_blocks.contains(&Block::probe(ptr));
        Block::new(ptr, size, is_head)
    }
}

/// Stream-ordered pool suballocator over an upstream memory resource.
///
/// `allocate` and `deallocate` are thread-safe; one mutex guards all pool
/// state for the full duration of each call. The upstream resource is
/// borrowed and must outlive the pool. Dropping the pool returns every
/// upstream allocation.
pub struct PoolResource<'up, R: AcceleratorRuntime> {
    runtime: R,
    inner: Mutex<PoolInner<'up, R::Event>>,
}

struct PoolInner<'up, E> {
    heap: StreamOrderedHeap<E>,
    plan: PoolPlan<'up>,
}

impl<'up, R: AcceleratorRuntime> PoolResource<'up, R> {
    /// Create a pool over `upstream` and allocate its initial chunk.
    ///
    /// Fails with `InvalidArgument` when a configured size is not a multiple
    /// of [`ALLOCATION_ALIGNMENT`] or the initial size exceeds the maximum,
    /// and with `OutOfMemory` when the initial chunk cannot be obtained.
    pub fn new(
        upstream: &'up dyn DeviceMemoryResource,
        runtime: R,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        if let Some(bytes) = config.initial_pool_size {
            if !is_aligned(bytes, ALLOCATION_ALIGNMENT) {
                return Err(PoolError::InvalidArgument(format!(
                    "initial pool size {} is not a multiple of {} bytes",
                    bytes, ALLOCATION_ALIGNMENT
                )));
            }
        }
        if let Some(bytes) = config.maximum_pool_size {
            if !is_aligned(bytes, ALLOCATION_ALIGNMENT) {
                return Err(PoolError::InvalidArgument(format!(
                    "maximum pool size {} is not a multiple of {} bytes",
                    bytes, ALLOCATION_ALIGNMENT
                )));
            }
        }

        let mut inner = PoolInner {
            heap: StreamOrderedHeap::new(),
            plan: PoolPlan {
                upstream,
                current_pool_size: 0,
                maximum_pool_size: config.maximum_pool_size,
                max_allocation_size: config.max_allocation_size.unwrap_or(usize::MAX),
                upstream_blocks: BTreeSet::new(),
                #[cfg(feature = "track-allocations")]
                allocated_blocks: BTreeSet::new(),
            },
        };
        if let Err(err) = Self::initialize_pool(&mut inner, &runtime, config.initial_pool_size) {
            inner.plan.release();
            return Err(err);
        }

        Ok(PoolResource {
            runtime,
            inner: Mutex::new(inner),
        })
    }

    /// Allocate the initial chunk and seed the default stream's free list.
    ///
    /// Without a configured size, targets half the free memory reported by
    /// upstream (when supported) or by the device.
    fn initialize_pool(
        inner: &mut PoolInner<'up, R::Event>,
        runtime: &R,
        initial_size: Option<usize>,
    ) -> PoolResult<()> {
        let try_size = match initial_size {
            Some(bytes) => bytes,
            None => {
                let (free, _total) = if inner.plan.upstream.supports_get_mem_info() {
                    inner.plan.upstream.get_mem_info(StreamHandle::DEFAULT)?
                } else {
                    runtime.device_mem_info()?
                };
                align_down(free / 2, ALLOCATION_ALIGNMENT)
            }
        };

        if let Some(maximum) = inner.plan.maximum_pool_size {
            if try_size > maximum {
                return Err(PoolError::InvalidArgument(format!(
                    "initial pool size {} exceeds the maximum pool size {}",
                    try_size, maximum
                )));
            }
        }

        if try_size > 0 {
            let block = inner
                .plan
                .try_to_expand(try_size, try_size, StreamHandle::DEFAULT)?;
            inner
                .heap
                .insert_block(runtime, block, StreamHandle::DEFAULT)?;
        }
        Ok(())
    }

    /// Total size of the pool, allocated plus free, in bytes.
    pub fn pool_size(&self) -> usize {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.plan.current_pool_size
    }

    /// Return every upstream block to the upstream resource and drop all
    /// per-stream state. Idempotent; also invoked on drop.
    pub fn release(&self) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let PoolInner { heap, plan } = &mut *guard;
        heap.clear(&self.runtime);
        plan.release();
    }

    /// Get the upstream resource this pool allocates from.
    pub fn upstream(&self) -> &'up dyn DeviceMemoryResource {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.plan.upstream
    }
}

impl<R: AcceleratorRuntime> DeviceMemoryResource for PoolResource<'_, R> {
    fn allocate(&self, size: usize, stream: StreamHandle) -> PoolResult<*mut c_void> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }
        let mut guard = self.inner.lock()?;
        let PoolInner { heap, plan } = &mut *guard;
        heap.allocate(plan, &self.runtime, size, stream)
    }

    fn deallocate(&self, ptr: *mut c_void, size: usize, stream: StreamHandle) {
        if ptr.is_null() || size == 0 {
            return;
        }
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let PoolInner { heap, plan } = &mut *guard;
        if let Err(err) = heap.deallocate(plan, &self.runtime, ptr, size, stream) {
            // deallocate has no error channel, and a runtime failure here
            // leaves the stream-ordering protocol unenforceable.
            tracing::error!(error = %err, ptr = ?ptr, "deallocate failed");
            if cfg!(debug_assertions) {
                panic!("deallocate failed: {err}");
            }
            std::process::abort();
        }
    }

    fn supports_streams(&self) -> bool {
        true
    }

    fn supports_get_mem_info(&self) -> bool {
        false
    }

    fn get_mem_info(&self, _stream: StreamHandle) -> PoolResult<(usize, usize)> {
        Ok((0, 0))
    }
}

impl<R: AcceleratorRuntime> Drop for PoolResource<'_, R> {
    fn drop(&mut self) {
        self.release();
    }
}
