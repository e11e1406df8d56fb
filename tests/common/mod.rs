//! Common test utilities for pool testing
//!
//! Fakes standing in for the two external collaborators:
//!
//! - [`SimulatedUpstream`]: a fixed-capacity device heap that hands out
//!   monotonically increasing fake addresses and counts traffic, so tests
//!   can assert the pool's upstream behavior without a GPU.
//! - [`FakeRuntime`]: an accelerator runtime that records every event
//!   operation, so tests can assert the cross-stream wait protocol.
//!
//! Fake device pointers are plain numbers; nothing ever dereferences them.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use rocmpool::{AcceleratorRuntime, DeviceMemoryResource, PoolError, PoolResult, StreamHandle};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * 1024;

/// Base address for simulated device pointers.
pub const FAKE_DEVICE_BASE: usize = 0x1000;

/// A fake stream handle with the given nonzero id.
pub fn stream(id: usize) -> StreamHandle {
    StreamHandle::from_raw(id as *mut c_void)
}

#[derive(Default)]
struct UpstreamState {
    bump: usize,
    outstanding: BTreeMap<usize, usize>,
    alloc_count: usize,
    dealloc_count: usize,
}

/// Fixed-capacity upstream that allocates sequentially at monotonically
/// increasing addresses. Freed ranges are never reissued, so every address
/// the pool ever sees is unique.
#[derive(Clone)]
pub struct SimulatedUpstream {
    capacity: usize,
    mem_info: Option<(usize, usize)>,
    state: Arc<Mutex<UpstreamState>>,
}

impl SimulatedUpstream {
    pub fn new(capacity: usize) -> Self {
        SimulatedUpstream {
            capacity,
            mem_info: None,
            state: Arc::new(Mutex::new(UpstreamState::default())),
        }
    }

    /// Advertise `get_mem_info` support with fixed numbers.
    pub fn with_mem_info(mut self, free: usize, total: usize) -> Self {
        self.mem_info = Some((free, total));
        self
    }

    pub fn alloc_count(&self) -> usize {
        self.state.lock().unwrap().alloc_count
    }

    pub fn dealloc_count(&self) -> usize {
        self.state.lock().unwrap().dealloc_count
    }

    pub fn outstanding_count(&self) -> usize {
        self.state.lock().unwrap().outstanding.len()
    }

    /// Sum of currently outstanding allocation sizes.
    pub fn outstanding_bytes(&self) -> usize {
        self.state.lock().unwrap().outstanding.values().sum()
    }

    /// Whether `ptr` lies inside some outstanding upstream allocation.
    pub fn owns(&self, ptr: *mut c_void) -> bool {
        let addr = ptr as usize;
        self.state
            .lock()
            .unwrap()
            .outstanding
            .iter()
            .any(|(start, size)| addr >= *start && addr < start + size)
    }
}

impl DeviceMemoryResource for SimulatedUpstream {
    fn allocate(&self, size: usize, _stream: StreamHandle) -> PoolResult<*mut c_void> {
        let mut state = self.state.lock().unwrap();
        if state.bump + size > self.capacity {
            return Err(PoolError::OutOfMemory(format!(
                "simulated device exhausted: {} + {} > {}",
                state.bump, size, self.capacity
            )));
        }
        let addr = FAKE_DEVICE_BASE + state.bump;
        state.bump += size;
        state.alloc_count += 1;
        state.outstanding.insert(addr, size);
        Ok(addr as *mut c_void)
    }

    fn deallocate(&self, ptr: *mut c_void, size: usize, _stream: StreamHandle) {
        let mut state = self.state.lock().unwrap();
        state.dealloc_count += 1;
        let removed = state.outstanding.remove(&(ptr as usize));
        assert_eq!(
            removed,
            Some(size),
            "upstream deallocate of unknown block {:?} ({} bytes)",
            ptr,
            size
        );
    }

    fn supports_get_mem_info(&self) -> bool {
        self.mem_info.is_some()
    }

    fn get_mem_info(&self, _stream: StreamHandle) -> PoolResult<(usize, usize)> {
        self.mem_info
            .ok_or_else(|| PoolError::InvalidArgument("mem info not supported".to_string()))
    }
}

/// One fake event, identified by creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeEvent {
    pub id: usize,
}

/// Every runtime operation the pool performs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCall {
    Record { event: usize, stream: StreamHandle },
    Wait { stream: StreamHandle, event: usize },
    Synchronize { event: usize },
}

#[derive(Default)]
struct RuntimeState {
    next_event: usize,
    calls: Vec<RuntimeCall>,
}

/// Accelerator runtime that records event traffic instead of talking to a
/// device. Clones share the log.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    mem_info: (usize, usize),
    state: Arc<Mutex<RuntimeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the `(free, total)` numbers reported for the device.
    pub fn with_mem_info(mut self, free: usize, total: usize) -> Self {
        self.mem_info = (free, total);
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Events recorded on `stream`, in order.
    pub fn records_on(&self, stream: StreamHandle) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Record { event, stream: s } if s == stream => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Waits issued on behalf of `stream`, in order.
    pub fn waits_by(&self, stream: StreamHandle) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Wait { event, stream: s } if s == stream => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Whether `waited_by` was made to wait on an event previously recorded
    /// on `recorded_on` (the cross-stream safety edge).
    pub fn wait_follows_record(&self, recorded_on: StreamHandle, waited_by: StreamHandle) -> bool {
        let calls = self.calls();
        for (i, call) in calls.iter().enumerate() {
            if let RuntimeCall::Record { event, stream } = call {
                if *stream == recorded_on {
                    let recorded = *event;
                    let waited = calls[i + 1..].iter().any(|later| {
                        matches!(
                            later,
                            RuntimeCall::Wait { stream, event }
                                if *stream == waited_by && *event == recorded
                        )
                    });
                    if waited {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl AcceleratorRuntime for FakeRuntime {
    type Event = FakeEvent;

    fn create_event(&self) -> PoolResult<FakeEvent> {
        let mut state = self.state.lock().unwrap();
        state.next_event += 1;
        Ok(FakeEvent {
            id: state.next_event,
        })
    }

    fn record_event(&self, event: &FakeEvent, stream: StreamHandle) -> PoolResult<()> {
        self.state.lock().unwrap().calls.push(RuntimeCall::Record {
            event: event.id,
            stream,
        });
        Ok(())
    }

    fn stream_wait_event(&self, stream: StreamHandle, event: &FakeEvent) -> PoolResult<()> {
        self.state.lock().unwrap().calls.push(RuntimeCall::Wait {
            stream,
            event: event.id,
        });
        Ok(())
    }

    fn synchronize_event(&self, event: &FakeEvent) -> PoolResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RuntimeCall::Synchronize { event: event.id });
        Ok(())
    }

    fn device_mem_info(&self) -> PoolResult<(usize, usize)> {
        Ok(self.mem_info)
    }
}
