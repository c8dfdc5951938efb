pub mod file;
pub mod memory;

use std::sync::Arc;

pub use file::FileClient;
pub use memory::MemoryClient;

/// Random access to the bytes of one COPC file.
///
/// Implementations must allow concurrent `get_range` calls from several
/// threads: distinct node chunks never overlap, so reads are independent.
pub trait ResourceClient: Send + Sync {
    /// Total length of the resource in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `length` bytes starting at `offset`.
    fn get_range(&self, offset: u64, length: usize) -> Result<Vec<u8>, ResourceError>;

    fn get(&self) -> Result<Vec<u8>, ResourceError> {
        let length = usize::try_from(self.len()).map_err(|_| ResourceError::OutOfBounds {
            offset: 0,
            length: usize::MAX,
            len: self.len(),
        })?;
        self.get_range(0, length)
    }
}

impl<C: ResourceClient> ResourceClient for Arc<C> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn get_range(&self, offset: u64, length: usize) -> Result<Vec<u8>, ResourceError> {
        (**self).get_range(offset, length)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Range of {length} bytes at offset {offset} exceeds resource length {len}")]
    OutOfBounds { offset: u64, length: usize, len: u64 },

    #[error("{0}")]
    Other(String),
}

/// Rejects reads past the end before touching the underlying storage.
pub(crate) fn check_range(offset: u64, length: usize, len: u64) -> Result<(), ResourceError> {
    let end = offset
        .checked_add(length as u64)
        .ok_or(ResourceError::OutOfBounds { offset, length, len })?;
    if end > len {
        return Err(ResourceError::OutOfBounds { offset, length, len });
    }
    Ok(())
}
