//! rocmpool - stream-ordered device memory pool for AMD GPUs
//!
//! A coalescing suballocator that carves large HIP device allocations into
//! aligned blocks and recycles them safely in the presence of asynchronous
//! streams. Memory freed on one stream can be reused on another without the
//! caller synchronizing: the pool records an event after every free and
//! inserts the matching stream-wait before handing the memory out elsewhere.
//!
//! The pool sits on any [`DeviceMemoryResource`] upstream and drives events
//! through an [`AcceleratorRuntime`]. With the `rocm` feature enabled the
//! crate provides both for HIP ([`DeviceResource`], [`HipRuntime`]); without
//! it the core builds and tests on machines with no GPU.
//!
//! ```ignore
//! use rocmpool::{DeviceMemoryResource, DeviceResource, HipRuntime, PoolConfig, PoolResource};
//!
//! let upstream = DeviceResource::new();
//! let runtime = HipRuntime::new(0)?;
//! let pool = PoolResource::new(
//!     &upstream,
//!     runtime,
//!     PoolConfig::new().with_initial_pool_size(64 << 20),
//! )?;
//!
//! let ptr = pool.allocate(1 << 20, stream.handle())?;
//! // ... launch kernels ...
//! pool.deallocate(ptr, 1 << 20, stream.handle());
//! # Ok::<(), rocmpool::PoolError>(())
//! ```

pub mod error;
pub mod logging;
pub mod mr;
pub mod runtime;

pub use error::{PoolError, PoolResult};
pub use mr::{
    Block, CoalescingFreeList, DeviceMemoryResource, PoolConfig, PoolResource,
    ALLOCATION_ALIGNMENT,
};
pub use runtime::{AcceleratorRuntime, StreamHandle};

#[cfg(feature = "rocm")]
pub use mr::device::DeviceResource;
#[cfg(feature = "rocm")]
pub use runtime::hip::{HipEvent, HipRuntime, HipStream};
