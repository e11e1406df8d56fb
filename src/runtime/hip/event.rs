//! HIP event wrapper

use std::ptr;

use crate::error::{PoolError, PoolResult};
use crate::runtime::hip::ffi;
use crate::runtime::StreamHandle;

// SAFETY: HipEvent is Send+Sync because it only contains a raw pointer and
// the HIP API is thread-safe on event handles.
// NOTE: HipEvent does NOT implement Clone because cloning raw pointers
// would cause double-free when both instances are dropped.
unsafe impl Send for HipEvent {}
unsafe impl Sync for HipEvent {}

/// Owned HIP event used to order work across streams.
#[derive(Debug)]
pub struct HipEvent {
    event: *mut std::ffi::c_void,
}

impl HipEvent {
    /// Create a synchronization-only event (timing disabled).
    pub fn new() -> PoolResult<Self> {
        let mut event: *mut std::ffi::c_void = ptr::null_mut();

        let result =
            unsafe { ffi::hipEventCreateWithFlags(&mut event, ffi::HIP_EVENT_DISABLE_TIMING) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "failed to create HIP event: {}",
                result
            )));
        }
        if event.is_null() {
            return Err(PoolError::DeviceError(
                "hipEventCreateWithFlags returned null pointer".to_string(),
            ));
        }

        Ok(HipEvent { event })
    }

    /// Record this event on `stream`, capturing all work submitted so far.
    pub fn record(&self, stream: StreamHandle) -> PoolResult<()> {
        let result = unsafe { ffi::hipEventRecord(self.event, stream.as_ptr()) };
        if result != ffi::HIP_SUCCESS {
            Err(PoolError::DeviceError(format!(
                "event record failed: {}",
                result
            )))
        } else {
            Ok(())
        }
    }

    /// Block the host until all work captured by this event has completed.
    pub fn synchronize(&self) -> PoolResult<()> {
        let result = unsafe { ffi::hipEventSynchronize(self.event) };
        if result != ffi::HIP_SUCCESS {
            Err(PoolError::DeviceError(format!(
                "event synchronization failed: {}",
                result
            )))
        } else {
            Ok(())
        }
    }

    /// Get raw event pointer (for FFI calls)
    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.event
    }
}

impl Drop for HipEvent {
    fn drop(&mut self) {
        if !self.event.is_null() {
            unsafe {
                ffi::hipEventDestroy(self.event);
            }
        }
    }
}
