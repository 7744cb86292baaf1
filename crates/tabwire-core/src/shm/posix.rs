//! POSIX shared-memory broker.
//!
//! The token is the UTF-8 name of a shared-memory object created by the host
//! (`shm_open(3)`). The object is mapped read-only and unmapped when the last
//! reference to the region drops.

// This module owns the mmap boundary.
#![allow(unsafe_code)]

use super::{MemoryBroker, SharedRegion};
use crate::{Result, WorkerError};
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::warn;

struct PosixRegion {
    name: String,
    ptr: Option<NonNull<c_void>>,
    len: usize,
}

impl SharedRegion for PosixRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_bytes(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: `ptr` is a live read-only mapping of exactly `len` bytes
            // created in `PosixShmBroker::open` and only unmapped in `drop`.
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr() as *const u8, self.len) },
            None => &[],
        }
    }
}

impl Drop for PosixRegion {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the mapping was created with this pointer and length and
            // no slice borrowed from it can outlive `self`.
            if let Err(e) = unsafe { munmap(ptr, self.len) } {
                warn!("Failed to unmap shared region {}: {}", self.name, e);
            }
        }
    }
}

/// Broker over named POSIX shared-memory objects.
#[derive(Debug, Default)]
pub struct PosixShmBroker;

impl PosixShmBroker {
    pub fn new() -> Self {
        Self
    }
}

fn shm_error(message: impl Into<String>) -> WorkerError {
    WorkerError::SharedMemory {
        message: message.into(),
    }
}

impl MemoryBroker for PosixShmBroker {
    fn open(&self, token: &[u8], byte_len: usize) -> Result<Arc<dyn SharedRegion>> {
        let raw = std::str::from_utf8(token)
            .map_err(|_| shm_error("memory handle is not a UTF-8 name"))?;
        let name = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{}", raw)
        };

        let fd = shm_open(name.as_str(), OFlag::O_RDONLY, Mode::empty())
            .map_err(|e| shm_error(format!("shm_open({}) failed: {}", name, e)))?;
        let file = File::from(fd);
        let available = file
            .metadata()
            .map_err(|e| shm_error(format!("cannot stat {}: {}", name, e)))?
            .len();
        if (available as u128) < byte_len as u128 {
            return Err(shm_error(format!(
                "region {} holds {} bytes, {} requested",
                name, available, byte_len
            )));
        }

        let ptr = match NonZeroUsize::new(byte_len) {
            Some(length) => {
                // SAFETY: a fresh read-only shared mapping at a kernel-chosen
                // address; the object is at least `byte_len` bytes long.
                let ptr = unsafe {
                    mmap(
                        None,
                        length,
                        ProtFlags::PROT_READ,
                        MapFlags::MAP_SHARED,
                        &file,
                        0,
                    )
                }
                .map_err(|e| shm_error(format!("mmap({}) failed: {}", name, e)))?;
                Some(ptr)
            }
            None => None,
        };

        Ok(Arc::new(PosixRegion {
            name,
            ptr,
            len: byte_len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::mman::shm_unlink;
    use std::io::Write;

    fn create_object(name: &str, bytes: &[u8]) {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();
        let mut file = File::from(fd);
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_maps_existing_object() {
        let name = format!("/tabwire-test-{}", std::process::id());
        create_object(&name, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let broker = PosixShmBroker::new();
        let token = name.trim_start_matches('/');
        let region = broker.open(token.as_bytes(), 4).unwrap();
        assert_eq!(region.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(region.name(), name);

        let too_big = broker.open(name.as_bytes(), 64);
        assert!(too_big.is_err());

        drop(region);
        shm_unlink(name.as_str()).unwrap();
    }

    #[test]
    fn test_missing_object_is_recoverable() {
        let err = PosixShmBroker::new()
            .open(b"/tabwire-does-not-exist", 4)
            .err()
            .unwrap();
        assert!(!err.is_fatal());
    }
}
