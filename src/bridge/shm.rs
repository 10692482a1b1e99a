//! The shared-memory segment backing one instance's ring pairs.
//!
//! One `memfd_create` segment per instance holds every worker's qpair
//! region back to back (see [`super::ring::QPairLayout`]); the client maps
//! the whole segment from the `shm_fd` handed over in the `CONFIG` message
//! and computes qpair offsets the same way the bridge does.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use memmap2::MmapMut;
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::unistd::ftruncate;

/// An anonymous, shareable memory segment mapped into this process and
/// exposed to a client process via its file descriptor.
pub struct SharedSegment {
    fd: OwnedFd,
    mmap: MmapMut,
}

impl SharedSegment {
    /// Create a new segment of exactly `size` bytes.
    pub fn create(name: &str, size: usize) -> std::io::Result<Self> {
        let cname = std::ffi::CString::new(name).map_err(std::io::Error::other)?;
        let fd = memfd_create(&cname, MFdFlags::empty()).map_err(std::io::Error::other)?;
        ftruncate(&fd, size as i64).map_err(std::io::Error::other)?;
        // SAFETY: `fd` was just created and truncated to `size`; no other
        // process can have mapped it yet, so `MmapMut::map_mut` sees a
        // fresh, exclusively-owned mapping at construction time.
        let mmap = unsafe { MmapMut::map_mut(&fd)? };
        Ok(Self { fd, mmap })
    }

    /// Size of the mapped segment in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// True if the segment has zero length (never true for a segment
    /// created via [`SharedSegment::create`] with a non-zero size).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Raw pointer to the start of the mapping, for qpair sub-region views.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// The segment's file descriptor, for `SCM_RIGHTS` handoff to the
    /// client. The bridge retains its own copy; the client receives a
    /// `dup`'d descriptor over the control socket.
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("fd", &self.fd.as_raw_fd())
            .field("size", &self.mmap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_maps_requested_size() {
        let seg = SharedSegment::create("snort-bridge-test", 4096).unwrap();
        assert_eq!(seg.len(), 4096);
        assert!(seg.as_raw_fd() >= 0);
    }

    #[test]
    fn mapped_memory_is_writable() {
        let mut seg = SharedSegment::create("snort-bridge-test-write", 64).unwrap();
        let ptr = seg.as_mut_ptr();
        // SAFETY: ptr is valid for `seg.len()` bytes for the lifetime of `seg`.
        unsafe {
            *ptr = 0xAB;
            assert_eq!(*ptr, 0xAB);
        }
    }
}
