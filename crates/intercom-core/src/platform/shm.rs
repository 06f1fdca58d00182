//! Named shared memory segments.
//!
//! # Platform Behavior
//! - **Linux/macOS**: `shm_open` + `mmap(MAP_SHARED)`. Segment names are
//!   prefixed with `/` and must not contain further slashes, so any `/` in
//!   the requested name is replaced with `_`. On macOS names are limited to
//!   31 bytes.
//! - **Windows**: pagefile-backed `CreateFileMappingW` + `MapViewOfFile`.
//!   The mapping disappears once the last handle is closed, so `remove` is a
//!   no-op.
//!
//! Freshly created segments are zero-filled on both platforms.

// This module owns the OS mapping boundary.
#![allow(unsafe_code)]

use std::io;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// How a segment is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the segment zero-filled if absent, open it otherwise.
    CreateOrOpen,
    /// Fail while the segment is absent or smaller than requested.
    OpenExisting,
}

/// A mapped view of a named shared memory segment.
///
/// The view is unmapped on drop. The segment itself outlives the mapping
/// until [`remove`] is called (Unix) or the last handle closes (Windows).
pub struct SharedMapping {
    ptr: NonNull<u8>,
    len: usize,
    #[cfg(windows)]
    handle: windows_sys::Win32::Foundation::HANDLE,
}

// SAFETY: the mapping is plain shared bytes. All access goes through
// `read_at`/`write_at`, which copy within bounds; concurrent modification by
// another thread or process can only produce stale bytes, which the channel
// protocol tolerates.
unsafe impl Send for SharedMapping {}
// SAFETY: see the `Send` impl above.
unsafe impl Sync for SharedMapping {}

impl SharedMapping {
    /// Map `len` bytes of the segment called `name`.
    pub fn open(name: &str, len: usize, mode: OpenMode) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared memory segments must not be empty",
            ));
        }

        let mapping = open_platform(name, len, mode)?;
        debug!("Mapped shared memory segment {} ({} bytes)", name, len);
        Ok(mapping)
    }

    /// Size of the mapped view in bytes.
    pub fn size(&self) -> usize {
        self.len
    }

    fn in_range(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .map(|end| end <= self.len)
            .unwrap_or(false)
    }

    /// Copy bytes out of the mapping. Returns `false` (copying nothing) when
    /// the range is outside the view.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> bool {
        if !self.in_range(offset, buf.len()) {
            return false;
        }
        // SAFETY: the range was checked against the mapped length above and
        // `buf` is a distinct local buffer, so the regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::Acquire);
        true
    }

    /// Copy bytes into the mapping. Returns `false` (copying nothing) when
    /// the range is outside the view.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> bool {
        if !self.in_range(offset, data.len()) {
            return false;
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
        // SAFETY: the range was checked against the mapped length above and
        // `data` lives outside the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset),
                data.len(),
            );
        }
        true
    }
}

impl std::fmt::Debug for SharedMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Remove a named segment so the next open creates it afresh.
///
/// Removing a segment that does not exist is not an error.
pub fn remove(name: &str) -> io::Result<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        match nix::sys::mman::shm_unlink(os_name(name).as_str()) {
            Ok(()) => {
                debug!("Removed shared memory segment {}", name);
                Ok(())
            }
            Err(Errno::ENOENT) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(unix))]
    {
        debug!("Segment {} is released with its last handle", name);
        Ok(())
    }
}

#[cfg(unix)]
fn os_name(name: &str) -> String {
    format!("/{}", name.replace('/', "_"))
}

#[cfg(unix)]
fn open_platform(name: &str, len: usize, mode: OpenMode) -> io::Result<SharedMapping> {
    use nix::fcntl::OFlag;
    use nix::sys::mman::{mmap, shm_open, MapFlags, ProtFlags};
    use nix::sys::stat::Mode;
    use std::num::NonZeroUsize;

    let flags = match mode {
        OpenMode::CreateOrOpen => OFlag::O_CREAT | OFlag::O_RDWR,
        OpenMode::OpenExisting => OFlag::O_RDWR,
    };
    let fd = shm_open(
        os_name(name).as_str(),
        flags,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )?;
    let file = std::fs::File::from(fd);

    let current = file.metadata()?.len();
    if current < len as u64 {
        match mode {
            OpenMode::CreateOrOpen => file.set_len(len as u64)?,
            OpenMode::OpenExisting => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "segment {} holds {} bytes, expected {}",
                        name, current, len
                    ),
                ));
            }
        }
    }

    let length = NonZeroUsize::new(len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty mapping"))?;

    // SAFETY: we request a fresh shared read/write mapping (no fixed address)
    // of a file descriptor whose size is at least `len`. The fd may be closed
    // after mmap returns; the mapping keeps the segment alive.
    let ptr = unsafe {
        mmap(
            None,
            length,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            &file,
            0,
        )?
    };

    Ok(SharedMapping {
        ptr: ptr.cast::<u8>(),
        len,
    })
}

#[cfg(windows)]
fn open_platform(name: &str, len: usize, mode: OpenMode) -> io::Result<SharedMapping> {
    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, OpenFileMappingW, FILE_MAP_ALL_ACCESS, PAGE_READWRITE,
    };

    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let size = len as u64;

    // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call,
    // and a null security-attributes pointer selects the default descriptor.
    let handle = unsafe {
        match mode {
            OpenMode::CreateOrOpen => CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                (size >> 32) as u32,
                size as u32,
                wide.as_ptr(),
            ),
            OpenMode::OpenExisting => OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide.as_ptr()),
        }
    };
    if handle.is_null() {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `handle` is a valid file-mapping handle obtained above.
    let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, len) };
    let Some(ptr) = NonNull::new(view.Value.cast::<u8>()) else {
        let err = io::Error::last_os_error();
        // SAFETY: the handle is valid and not used after this point.
        unsafe { CloseHandle(handle) };
        return Err(err);
    };

    Ok(SharedMapping { ptr, len, handle })
}

#[cfg(not(any(unix, windows)))]
fn open_platform(_name: &str, _len: usize, _mode: OpenMode) -> io::Result<SharedMapping> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named shared memory is not supported on this platform",
    ))
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: `ptr`/`len` describe a mapping created by `mmap` in
            // `open_platform` that has not been unmapped yet.
            if let Err(e) = unsafe { nix::sys::mman::munmap(self.ptr.cast(), self.len) } {
                warn!("Failed to unmap shared memory view: {}", e);
            }
        }

        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::CloseHandle;
            use windows_sys::Win32::System::Memory::{
                UnmapViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS,
            };

            // SAFETY: the view and handle were created in `open_platform`
            // and are released exactly once here.
            unsafe {
                if UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                    Value: self.ptr.as_ptr().cast(),
                }) == 0
                {
                    warn!(
                        "Failed to unmap shared memory view: {}",
                        io::Error::last_os_error()
                    );
                }
                CloseHandle(self.handle);
            }
        }
    }
}
