//! Raw device memory resource
//!
//! The production upstream for a pool: allocates directly from the device
//! heap with hipMalloc/hipFree. Streams carry no meaning here; hipMalloc
//! synchronizes the whole device.

use std::ffi::c_void;
use std::ptr;

use crate::error::{PoolError, PoolResult};
use crate::mr::resource::DeviceMemoryResource;
use crate::runtime::hip::ffi;
use crate::runtime::StreamHandle;

/// Memory resource backed by the raw HIP device allocator.
#[derive(Debug, Default)]
pub struct DeviceResource;

impl DeviceResource {
    pub fn new() -> Self {
        DeviceResource
    }
}

impl DeviceMemoryResource for DeviceResource {
    fn allocate(&self, size: usize, _stream: StreamHandle) -> PoolResult<*mut c_void> {
        let mut out: *mut c_void = ptr::null_mut();
        let result = unsafe { ffi::hipMalloc(&mut out, size) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::OutOfMemory(format!(
                "hipMalloc failed with code {} for {} bytes",
                result, size
            )));
        }
        if out.is_null() {
            return Err(PoolError::OutOfMemory(format!(
                "hipMalloc returned null pointer for {} bytes",
                size
            )));
        }
        tracing::trace!(bytes = size, ptr = ?out, "hipMalloc");
        Ok(out)
    }

    fn deallocate(&self, ptr: *mut c_void, _size: usize, _stream: StreamHandle) {
        if !ptr.is_null() {
            unsafe {
                ffi::hipFree(ptr);
            }
        }
    }

    fn supports_get_mem_info(&self) -> bool {
        true
    }

    fn get_mem_info(&self, _stream: StreamHandle) -> PoolResult<(usize, usize)> {
        let mut free = 0usize;
        let mut total = 0usize;
        let result = unsafe { ffi::hipMemGetInfo(&mut free, &mut total) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "hipMemGetInfo failed with code {}",
                result
            )));
        }
        Ok((free, total))
    }
}
