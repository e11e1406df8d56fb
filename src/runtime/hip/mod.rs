//! HIP-backed accelerator runtime
//!
//! Thin RAII wrappers over the HIP stream/event API plus the
//! [`AcceleratorRuntime`](crate::runtime::AcceleratorRuntime) implementation
//! the pool uses in production. Requires the `rocm` feature and a ROCm
//! install at link time.

mod event;
pub(crate) mod ffi;
mod runtime;
mod stream;

pub use event::HipEvent;
pub use runtime::HipRuntime;
pub use stream::HipStream;
