//! Heap-backed broker for embedders that share memory without an OS object.

use super::{MemoryBroker, SharedRegion};
use crate::{Result, WorkerError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

struct HeapRegion {
    name: String,
    bytes: Arc<[u8]>,
}

impl SharedRegion for HeapRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A broker whose regions are byte buffers registered up front.
///
/// Tokens are the UTF-8 names given to [`InMemoryBroker::insert`].
#[derive(Default)]
pub struct InMemoryBroker {
    regions: RefCell<HashMap<String, Arc<[u8]>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.regions.borrow_mut().insert(name.into(), bytes.into());
    }
}

impl MemoryBroker for InMemoryBroker {
    fn open(&self, token: &[u8], byte_len: usize) -> Result<Arc<dyn SharedRegion>> {
        let name = std::str::from_utf8(token).map_err(|_| WorkerError::SharedMemory {
            message: "memory handle is not a UTF-8 name".to_string(),
        })?;
        let bytes = self
            .regions
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkerError::SharedMemory {
                message: format!("no shared region named {}", name),
            })?;
        if bytes.len() < byte_len {
            return Err(WorkerError::SharedMemory {
                message: format!(
                    "region {} holds {} bytes, {} requested",
                    name,
                    bytes.len(),
                    byte_len
                ),
            });
        }
        Ok(Arc::new(HeapRegion {
            name: name.to_string(),
            bytes,
        }))
    }
}
