//! HIP stream wrapper

use std::ptr;

use crate::error::{PoolError, PoolResult};
use crate::runtime::hip::ffi;
use crate::runtime::StreamHandle;

// SAFETY: HipStream is Send+Sync because it only contains a raw pointer and
// the HIP API is thread-safe on stream handles.
// NOTE: HipStream does NOT implement Clone because cloning raw pointers
// would cause double-free when both instances are dropped.
unsafe impl Send for HipStream {}
unsafe impl Sync for HipStream {}

/// Owned HIP stream. Dropped streams are destroyed.
#[derive(Debug)]
pub struct HipStream {
    stream: *mut std::ffi::c_void,
}

impl HipStream {
    /// Create a new HIP stream
    pub fn new() -> PoolResult<Self> {
        let mut stream: *mut std::ffi::c_void = ptr::null_mut();

        let result = unsafe { ffi::hipStreamCreate(&mut stream) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "failed to create HIP stream: {}",
                result
            )));
        }
        if stream.is_null() {
            return Err(PoolError::DeviceError(
                "hipStreamCreate returned null pointer".to_string(),
            ));
        }

        tracing::debug!(stream = ?stream, "HIP stream created");
        Ok(HipStream { stream })
    }

    /// Block the host until all work submitted to the stream has completed.
    pub fn synchronize(&self) -> PoolResult<()> {
        let result = unsafe { ffi::hipStreamSynchronize(self.stream) };
        if result != ffi::HIP_SUCCESS {
            Err(PoolError::DeviceError(format!(
                "stream synchronization failed: {}",
                result
            )))
        } else {
            Ok(())
        }
    }

    /// Non-owning handle for pool calls and map keys.
    pub fn handle(&self) -> StreamHandle {
        StreamHandle::from_raw(self.stream)
    }
}

impl Drop for HipStream {
    fn drop(&mut self) {
        if !self.stream.is_null() {
            unsafe {
                ffi::hipStreamDestroy(self.stream);
            }
        }
    }
}
