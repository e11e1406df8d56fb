//! Accelerator runtime interface consumed by the pool
//!
//! The pool never talks to HIP directly; it records and waits on events
//! through the [`AcceleratorRuntime`] trait so the stream-ordering protocol
//! can be exercised against a fake runtime in tests. The HIP-backed
//! implementation lives in [`hip`] and requires the `rocm` feature.

use std::ffi::c_void;
use std::ptr;

use crate::error::PoolResult;

#[cfg(feature = "rocm")]
pub mod hip;

// SAFETY: StreamHandle is a non-owning view of a hipStream_t. The handle is
// an opaque token passed back to the driver; it is never dereferenced on the
// host.
unsafe impl Send for StreamHandle {}
unsafe impl Sync for StreamHandle {}

/// Non-owning view of a HIP stream.
///
/// Streams compare and hash by handle value so they can key per-stream
/// bookkeeping maps. The null handle is the legacy default stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StreamHandle {
    stream: *mut c_void,
}

impl StreamHandle {
    /// The legacy default stream.
    pub const DEFAULT: StreamHandle = StreamHandle {
        stream: ptr::null_mut(),
    };

    /// Wrap a raw `hipStream_t`.
    pub fn from_raw(stream: *mut c_void) -> Self {
        StreamHandle { stream }
    }

    /// Get the raw stream pointer (for FFI calls)
    pub fn as_ptr(&self) -> *mut c_void {
        self.stream
    }

    /// Whether this is the legacy default stream.
    pub fn is_default(&self) -> bool {
        self.stream.is_null()
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        StreamHandle::DEFAULT
    }
}

/// Event and device facilities the pool needs from the accelerator runtime.
///
/// `Event` is an opaque marker recorded on a stream; another stream waiting
/// on it establishes a happens-before edge on the device. All methods are
/// host-side and return quickly; the waits they enqueue run asynchronously.
pub trait AcceleratorRuntime: Send + Sync {
    type Event: Send;

    fn create_event(&self) -> PoolResult<Self::Event>;

    /// Record `event` on `stream`, capturing all work submitted so far.
    fn record_event(&self, event: &Self::Event, stream: StreamHandle) -> PoolResult<()>;

    /// Make future work on `stream` wait until `event` has completed.
    fn stream_wait_event(&self, stream: StreamHandle, event: &Self::Event) -> PoolResult<()>;

    /// Block the host until `event` has completed.
    fn synchronize_event(&self, event: &Self::Event) -> PoolResult<()>;

    /// Free and total memory of the bound device, in bytes.
    fn device_mem_info(&self) -> PoolResult<(usize, usize)>;
}
