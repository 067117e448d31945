pub mod ffmpeg_library;
pub mod file_stats_storage;
#[cfg(any(test, feature = "test-support"))]
pub mod memory_library;
#[cfg(any(test, feature = "test-support"))]
pub mod memory_stats_storage;
