//! Device memory resource interface

use std::ffi::c_void;

use crate::error::PoolResult;
use crate::runtime::StreamHandle;

/// Interface for sources of raw device memory.
///
/// The pool consumes this interface upstream and exposes it downstream, so
/// resources compose: a pool can sit on the raw device allocator, and other
/// suballocators can sit on a pool.
pub trait DeviceMemoryResource: Send + Sync {
    /// Allocate at least `size` bytes usable on `stream`.
    ///
    /// Returns a device pointer owned by the caller until the matching
    /// [`deallocate`](Self::deallocate) on the same resource.
    fn allocate(&self, size: usize, stream: StreamHandle) -> PoolResult<*mut c_void>;

    /// Return memory obtained from [`allocate`](Self::allocate).
    ///
    /// `size` must equal the original allocation size. Infallible at this
    /// boundary.
    fn deallocate(&self, ptr: *mut c_void, size: usize, stream: StreamHandle);

    /// Whether non-default streams carry meaning for this resource.
    fn supports_streams(&self) -> bool {
        false
    }

    /// Whether [`get_mem_info`](Self::get_mem_info) reports real numbers.
    fn supports_get_mem_info(&self) -> bool {
        false
    }

    /// `(free, total)` device memory in bytes, or `(0, 0)` when unsupported.
    fn get_mem_info(&self, _stream: StreamHandle) -> PoolResult<(usize, usize)> {
        Ok((0, 0))
    }

    /// Reference-identity equality: two resources are equal iff they are the
    /// same object.
    fn is_equal(&self, other: &dyn DeviceMemoryResource) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn DeviceMemoryResource)
    }
}
