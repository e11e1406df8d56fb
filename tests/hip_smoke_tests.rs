//! HIP smoke tests
//!
//! Minimal end-to-end checks against a real device. These only compile with
//! the `rocm` feature and skip gracefully when no AMD GPU is present.

#![cfg(feature = "rocm")]

use rocmpool::{
    DeviceMemoryResource, DeviceResource, HipRuntime, HipStream, PoolConfig, PoolResource,
};
use serial_test::serial;

const MIB: usize = 1024 * 1024;

fn runtime() -> Option<HipRuntime> {
    match HipRuntime::new(0) {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            eprintln!("GPU not available - skipping: {err}");
            None
        }
    }
}

#[test]
#[serial]
fn test_pool_round_trip_on_device() {
    let Some(runtime) = runtime() else { return };
    let upstream = DeviceResource::new();
    let pool = PoolResource::new(
        &upstream,
        runtime,
        PoolConfig::new()
            .with_initial_pool_size(8 * MIB)
            .with_maximum_pool_size(16 * MIB),
    )
    .expect("pool construction failed");
    let stream = HipStream::new().expect("stream creation failed");

    let ptr = pool.allocate(MIB, stream.handle()).expect("allocate failed");
    assert!(!ptr.is_null());
    pool.deallocate(ptr, MIB, stream.handle());

    let again = pool.allocate(MIB, stream.handle()).expect("allocate failed");
    assert_eq!(again, ptr);
    pool.deallocate(again, MIB, stream.handle());

    stream.synchronize().expect("stream sync failed");
}

#[test]
#[serial]
fn test_cross_stream_reuse_on_device() {
    let Some(runtime) = runtime() else { return };
    let upstream = DeviceResource::new();
    let pool = PoolResource::new(
        &upstream,
        runtime,
        PoolConfig::new().with_initial_pool_size(8 * MIB),
    )
    .expect("pool construction failed");

    let sa = HipStream::new().expect("stream creation failed");
    let sb = HipStream::new().expect("stream creation failed");

    let ptr = pool.allocate(MIB, sa.handle()).expect("allocate failed");
    pool.deallocate(ptr, MIB, sa.handle());

    // The pool inserts the event wait that makes this reuse safe.
    let again = pool.allocate(MIB, sb.handle()).expect("allocate failed");
    assert_eq!(again, ptr);
    pool.deallocate(again, MIB, sb.handle());

    sb.synchronize().expect("stream sync failed");
}
