//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than being scattered through the channel code.
//!
//! # Architecture
//!
//! - `shm` - Named shared memory segments (create/open, map, remove)
//!
//! # Supported Platforms
//!
//! - **Linux**: Full support
//! - **macOS**: Full support (POSIX shared memory, short names)
//! - **Windows**: Full support

pub mod shm;

pub use shm::{OpenMode, SharedMapping};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns true if named shared memory is available on this platform.
pub fn is_supported_platform() -> bool {
    cfg!(any(unix, windows))
}
