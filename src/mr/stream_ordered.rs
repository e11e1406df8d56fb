//! Stream-ordered suballocation machinery
//!
//! Accelerator streams run submitted work asynchronously, so a pointer
//! "freed" on stream A may still be read by in-flight kernels. Handing it to
//! stream B is only safe once B waits on an event recorded on A after the
//! free. This module keeps one free list and one reuse event per stream and
//! inserts the required waits whenever free blocks migrate between streams.
//!
//! The owning pool plugs in through [`SuballocatorPolicy`]: the hooks that
//! split blocks, resolve freed pointers, and grow the pool from upstream.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ffi::c_void;

use crate::error::{PoolError, PoolResult};
use crate::mr::block::Block;
use crate::mr::free_list::CoalescingFreeList;
use crate::mr::{align_up, ALLOCATION_ALIGNMENT};
use crate::runtime::{AcceleratorRuntime, StreamHandle};

/// An allocated block and the unallocated remainder of its source block.
pub(crate) struct SplitBlock {
    pub allocated: Block,
    pub remainder: Option<Block>,
}

/// Hooks the stream-ordered base invokes on the owning pool.
pub(crate) trait SuballocatorPolicy {
    /// Largest single allocation this resource accepts, in bytes.
    fn max_allocation_size(&self) -> usize;

    /// Obtain a block of at least `size` bytes from upstream. `blocks` is
    /// the caller's free list, available to policies that want to place
    /// fragments directly.
    fn expand_pool(
        &mut self,
        size: usize,
        blocks: &mut CoalescingFreeList,
        stream: StreamHandle,
    ) -> PoolResult<Block>;

    /// Split `block` to satisfy an allocation of `size` bytes.
    fn allocate_from_block(&mut self, block: Block, size: usize) -> SplitBlock;

    /// Reconstruct the block for a `(pointer, size)` pair being freed.
    fn free_block(&mut self, ptr: *mut c_void, size: usize) -> Block;
}

/// Free blocks and the reuse event for one stream.
struct StreamState<E> {
    free_blocks: CoalescingFreeList,
    /// Recorded on the stream after every deallocation; waiting on it makes
    /// the freed memory safe to reuse elsewhere.
    event: E,
}

/// Per-stream free lists plus the event protocol that lets them share
/// memory.
pub(crate) struct StreamOrderedHeap<E> {
    states: BTreeMap<StreamHandle, StreamState<E>>,
}

impl<E> StreamOrderedHeap<E> {
    pub fn new() -> Self {
        StreamOrderedHeap {
            states: BTreeMap::new(),
        }
    }

    fn state_mut<R>(
        &mut self,
        runtime: &R,
        stream: StreamHandle,
    ) -> PoolResult<&mut StreamState<E>>
    where
        R: AcceleratorRuntime<Event = E>,
    {
        match self.states.entry(stream) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let event = runtime.create_event()?;
                Ok(entry.insert(StreamState {
                    free_blocks: CoalescingFreeList::new(),
                    event,
                }))
            }
        }
    }

    /// Seed `stream`'s free list with `block` (used for the initial pool
    /// allocation).
    pub fn insert_block<R>(
        &mut self,
        runtime: &R,
        block: Block,
        stream: StreamHandle,
    ) -> PoolResult<()>
    where
        R: AcceleratorRuntime<Event = E>,
    {
        self.state_mut(runtime, stream)?.free_blocks.insert(block);
        Ok(())
    }

    /// Allocate `size` bytes (unaligned, nonzero) for use on `stream`.
    pub fn allocate<P, R>(
        &mut self,
        policy: &mut P,
        runtime: &R,
        size: usize,
        stream: StreamHandle,
    ) -> PoolResult<*mut c_void>
    where
        P: SuballocatorPolicy,
        R: AcceleratorRuntime<Event = E>,
    {
        let size = align_up(size, ALLOCATION_ALIGNMENT);
        if size > policy.max_allocation_size() {
            return Err(PoolError::SizeExceeded {
                requested: size,
                maximum: policy.max_allocation_size(),
            });
        }

        let block = self.get_block(policy, runtime, size, stream)?;
        let split = policy.allocate_from_block(block, size);
        if let Some(remainder) = split.remainder {
            if let Some(state) = self.states.get_mut(&stream) {
                state.free_blocks.insert(remainder);
            }
        }
        tracing::trace!(stream = ?stream, bytes = size, ptr = ?split.allocated.pointer(), "allocate");
        Ok(split.allocated.pointer())
    }

    /// Return `(ptr, size)` to `stream`'s free list and record the reuse
    /// event.
    pub fn deallocate<P, R>(
        &mut self,
        policy: &mut P,
        runtime: &R,
        ptr: *mut c_void,
        size: usize,
        stream: StreamHandle,
    ) -> PoolResult<()>
    where
        P: SuballocatorPolicy,
        R: AcceleratorRuntime<Event = E>,
    {
        let size = align_up(size, ALLOCATION_ALIGNMENT);
        let block = policy.free_block(ptr, size);
        let state = self.state_mut(runtime, stream)?;
        // Another stream may only reuse this memory after waiting on the
        // event, which captures all work submitted to `stream` so far.
        runtime.record_event(&state.event, stream)?;
        state.free_blocks.insert(block);
        tracing::trace!(stream = ?stream, bytes = size, ptr = ?ptr, "deallocate");
        Ok(())
    }

    /// Find a block of at least `size` bytes for `stream`: first the
    /// stream's own list, then other streams' lists (with the event wait),
    /// finally upstream growth.
    fn get_block<P, R>(
        &mut self,
        policy: &mut P,
        runtime: &R,
        size: usize,
        stream: StreamHandle,
    ) -> PoolResult<Block>
    where
        P: SuballocatorPolicy,
        R: AcceleratorRuntime<Event = E>,
    {
        // The stream's own list needs no synchronization.
        if let Some(block) = self.state_mut(runtime, stream)?.free_blocks.find_best(size) {
            return Ok(block);
        }

        if let Some(block) = self.get_block_from_other_stream(runtime, size, stream)? {
            return Ok(block);
        }

        self.log_summary(size);

        let state = match self.states.get_mut(&stream) {
            Some(state) => state,
            None => {
                return Err(PoolError::OutOfMemory(
                    "allocating stream lost its free list".to_string(),
                ))
            }
        };
        let block = policy.expand_pool(size, &mut state.free_blocks, stream)?;
        state.free_blocks.insert(block);
        state.free_blocks.find_best(size).ok_or_else(|| {
            PoolError::OutOfMemory(format!(
                "expanded block did not satisfy a {} byte request",
                size
            ))
        })
    }

    /// Scan other streams in ascending handle order for a list holding a fit.
    /// The first such list is drained into the caller's list after the
    /// caller's stream is made to wait on the owner's reuse event.
    fn get_block_from_other_stream<R>(
        &mut self,
        runtime: &R,
        size: usize,
        stream: StreamHandle,
    ) -> PoolResult<Option<Block>>
    where
        R: AcceleratorRuntime<Event = E>,
    {
        let donor = self
            .states
            .iter()
            .find(|(other, state)| **other != stream && state.free_blocks.has_fit(size))
            .map(|(other, _)| *other);
        let Some(donor) = donor else {
            return Ok(None);
        };

        let taken = match self.states.get_mut(&donor) {
            Some(state) => {
                // The donor's freed blocks may still be referenced by
                // in-flight work; the wait establishes the required
                // happens-before edge before any of them are handed out.
                runtime.stream_wait_event(stream, &state.event)?;
                std::mem::take(&mut state.free_blocks)
            }
            None => return Ok(None),
        };

        tracing::debug!(
            donor = ?donor,
            stream = ?stream,
            blocks = taken.len(),
            "reclaiming free blocks across streams"
        );

        let state = match self.states.get_mut(&stream) {
            Some(state) => state,
            None => return Ok(None),
        };
        state.free_blocks.merge(taken);
        Ok(state.free_blocks.find_best(size))
    }

    fn log_summary(&self, size: usize) {
        for (stream, state) in &self.states {
            let (largest, total) = state.free_blocks.summary();
            tracing::debug!(
                stream = ?stream,
                largest,
                total,
                "no free block of {} bytes; growing pool",
                size
            );
        }
    }

    /// Synchronize every stream's reuse event and drop all per-stream state.
    pub fn clear<R>(&mut self, runtime: &R)
    where
        R: AcceleratorRuntime<Event = E>,
    {
        for state in self.states.values() {
            if let Err(err) = runtime.synchronize_event(&state.event) {
                tracing::warn!(error = %err, "event synchronize failed during release");
            }
        }
        self.states.clear();
    }
}
