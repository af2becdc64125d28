//! Benchmark harness utilities.

/// Create a multi-threaded Tokio runtime for async benchmarks.
pub fn bench_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime for benchmarks")
}

/// Create a current-thread Tokio runtime (for single-threaded benchmarks).
pub fn bench_runtime_single() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build single-thread Tokio runtime")
}

/// Standard benchmark iteration counts.
pub struct BenchSizes;

impl BenchSizes {
    /// Small iteration count for expensive operations.
    pub const SMALL: usize = 100;
    /// Medium iteration count.
    pub const MEDIUM: usize = 1_000;
}
