// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! POSIX shared-memory segment: `shm_open` + `mmap` wrapper.
//!
//! A segment is created by its reader (the enqueue side maps it read-write
//! by name). The creator unlinks the name on drop; mappings stay valid for
//! peers that already mapped it.

use std::ffi::CString;
use std::io;

use crate::error::{Error, Result};

/// Name of the segment backing a segment id.
#[must_use]
pub fn segment_name(segment_id: u32) -> String {
    format!("/sdds_seg_{:08x}", segment_id)
}

/// A mapped shared-memory segment.
pub struct ShmSegment {
    ptr: *mut u8,
    len: usize,
    name: CString,
    owner: bool,
}

// The mapping is plain memory; synchronization happens through the atomics
// embedded in the ring header.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create (or replace) a segment of `len` bytes and map it.
    pub fn create(segment_id: u32, len: usize) -> Result<Self> {
        let name = CString::new(segment_name(segment_id))
            .map_err(|_| Error::InvalidArgument("segment name".into()))?;
        unsafe {
            let fd = libc::shm_open(
                name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::mode_t,
            );
            if fd < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            if libc::ftruncate(fd, len as libc::off_t) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(name.as_ptr());
                return Err(Error::Io(err));
            }
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if ptr == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                libc::shm_unlink(name.as_ptr());
                return Err(Error::Io(err));
            }
            // Fresh segments are zero-filled by ftruncate, which is what
            // the ring header initialization relies on.
            Ok(Self {
                ptr: ptr.cast(),
                len,
                name,
                owner: true,
            })
        }
    }

    /// Map an existing segment created by a peer.
    pub fn open(segment_id: u32, len: usize) -> Result<Self> {
        let name = CString::new(segment_name(segment_id))
            .map_err(|_| Error::InvalidArgument("segment name".into()))?;
        unsafe {
            let fd = libc::shm_open(name.as_ptr(), libc::O_RDWR, 0);
            if fd < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if ptr == libc::MAP_FAILED {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            Ok(Self {
                ptr: ptr.cast(),
                len,
                name,
                owner: false,
            })
        }
    }

    /// Base pointer of the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Mapping length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
            if self.owner {
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}
