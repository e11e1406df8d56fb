//! HIP runtime binding

use crate::error::{PoolError, PoolResult};
use crate::runtime::hip::event::HipEvent;
use crate::runtime::hip::ffi;
use crate::runtime::{AcceleratorRuntime, StreamHandle};

/// Accelerator runtime bound to one HIP device.
///
/// One pool serves one device; the runtime selects the device at
/// construction and all event and memory-info calls act on it.
#[derive(Debug)]
pub struct HipRuntime {
    device_id: i32,
}

impl HipRuntime {
    /// Bind to `device_id`, making it the active device.
    pub fn new(device_id: i32) -> PoolResult<Self> {
        let result = unsafe { ffi::hipSetDevice(device_id) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "hipSetDevice({}) failed: {}",
                device_id, result
            )));
        }
        tracing::debug!(device_id, "HIP runtime bound");
        Ok(HipRuntime { device_id })
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Number of HIP devices visible to the process.
    pub fn device_count() -> PoolResult<i32> {
        let mut count = 0i32;
        let result = unsafe { ffi::hipGetDeviceCount(&mut count) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "hipGetDeviceCount failed: {}",
                result
            )));
        }
        Ok(count)
    }
}

impl AcceleratorRuntime for HipRuntime {
    type Event = HipEvent;

    fn create_event(&self) -> PoolResult<HipEvent> {
        HipEvent::new()
    }

    fn record_event(&self, event: &HipEvent, stream: StreamHandle) -> PoolResult<()> {
        event.record(stream)
    }

    fn stream_wait_event(&self, stream: StreamHandle, event: &HipEvent) -> PoolResult<()> {
        let result = unsafe { ffi::hipStreamWaitEvent(stream.as_ptr(), event.as_ptr(), 0) };
        if result != ffi::HIP_SUCCESS {
            Err(PoolError::DeviceError(format!(
                "hipStreamWaitEvent failed: {}",
                result
            )))
        } else {
            Ok(())
        }
    }

    fn synchronize_event(&self, event: &HipEvent) -> PoolResult<()> {
        event.synchronize()
    }

    fn device_mem_info(&self) -> PoolResult<(usize, usize)> {
        let mut free = 0usize;
        let mut total = 0usize;
        let result = unsafe { ffi::hipMemGetInfo(&mut free, &mut total) };
        if result != ffi::HIP_SUCCESS {
            return Err(PoolError::DeviceError(format!(
                "hipMemGetInfo failed: {}",
                result
            )));
        }
        Ok((free, total))
    }
}
