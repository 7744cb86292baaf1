//! Shared-memory bridge.
//!
//! The host hands the worker an opaque token naming a block of memory it
//! owns. A [`MemoryBroker`] turns the token into a mapped [`SharedRegion`],
//! and the [`HandleSlot`] tracks the single handle that may be open at any
//! time.

mod array;
mod memory;
#[cfg(unix)]
mod posix;

pub use array::{byte_len, parse_shape, ArrayView, DType};
pub use memory::InMemoryBroker;
#[cfg(unix)]
pub use posix::PosixShmBroker;

use crate::{Result, WorkerError};
use std::sync::Arc;
use tracing::debug;

/// A block of memory mapped into this process.
pub trait SharedRegion {
    /// The name the region was opened under.
    fn name(&self) -> &str;

    fn as_bytes(&self) -> &[u8];
}

/// Opens host-issued memory tokens.
pub trait MemoryBroker {
    /// Map `byte_len` bytes of the memory named by `token`.
    fn open(&self, token: &[u8], byte_len: usize) -> Result<Arc<dyn SharedRegion>>;
}

/// The broker used when none is configured.
#[cfg(unix)]
pub fn default_broker() -> Box<dyn MemoryBroker> {
    Box::new(PosixShmBroker::new())
}

#[cfg(not(unix))]
pub fn default_broker() -> Box<dyn MemoryBroker> {
    Box::new(InMemoryBroker::new())
}

/// Holder for the one outstanding memory handle.
///
/// Opening while a handle is held fails with
/// [`WorkerError::HandleAlreadyOpen`], which is fatal. Closing while empty
/// fails with [`WorkerError::NoHandle`], which is reported to the host.
#[derive(Default)]
pub struct HandleSlot {
    current: Option<Arc<dyn SharedRegion>>,
}

impl HandleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Name of the open region, if any.
    pub fn name(&self) -> Option<&str> {
        self.current.as_deref().map(|region| region.name())
    }

    /// Open `token` through `broker` and hold the result.
    ///
    /// The slot is checked before the broker is called, so a second open
    /// never maps anything.
    pub fn open(
        &mut self,
        broker: &dyn MemoryBroker,
        token: &[u8],
        byte_len: usize,
    ) -> Result<Arc<dyn SharedRegion>> {
        if self.current.is_some() {
            return Err(WorkerError::HandleAlreadyOpen);
        }
        let region = broker.open(token, byte_len)?;
        debug!("Opened shared region {} ({} bytes)", region.name(), byte_len);
        self.current = Some(Arc::clone(&region));
        Ok(region)
    }

    /// Release the held handle.
    pub fn close(&mut self) -> Result<()> {
        let region = self.current.take().ok_or(WorkerError::NoHandle)?;
        debug!("Closed shared region {}", region.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_with(name: &str, bytes: Vec<u8>) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.insert(name, bytes);
        broker
    }

    #[test]
    fn test_open_then_close() {
        let broker = broker_with("a", vec![1, 2, 3, 4]);
        let mut slot = HandleSlot::new();
        assert!(!slot.is_open());

        let region = slot.open(&broker, b"a", 4).unwrap();
        assert_eq!(region.as_bytes(), &[1, 2, 3, 4]);
        assert!(slot.is_open());
        assert_eq!(slot.name(), Some("a"));

        slot.close().unwrap();
        assert!(!slot.is_open());
    }

    #[test]
    fn test_second_open_is_fatal() {
        let broker = broker_with("a", vec![0; 8]);
        let mut slot = HandleSlot::new();
        slot.open(&broker, b"a", 8).unwrap();

        let err = slot.open(&broker, b"a", 8).err().unwrap();
        assert!(matches!(err, WorkerError::HandleAlreadyOpen));
        assert!(err.is_fatal());
        assert!(slot.is_open());
    }

    #[test]
    fn test_close_without_handle_is_reported() {
        let mut slot = HandleSlot::new();
        let err = slot.close().unwrap_err();
        assert!(matches!(err, WorkerError::NoHandle));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_view_outlives_slot() {
        let broker = broker_with("a", vec![5, 6]);
        let mut slot = HandleSlot::new();
        let region = slot.open(&broker, b"a", 2).unwrap();
        let view = ArrayView::mapped(DType::Uint8, vec![2], region).unwrap();
        slot.close().unwrap();
        assert_eq!(view.as_bytes(), &[5, 6]);
    }

    #[test]
    fn test_failed_open_leaves_slot_empty() {
        let broker = InMemoryBroker::new();
        let mut slot = HandleSlot::new();
        assert!(slot.open(&broker, b"missing", 4).is_err());
        assert!(!slot.is_open());
    }
}
