use super::{check_range, ResourceClient, ResourceError};
use bytes::Bytes;

/// A COPC file held entirely in memory.
#[derive(Clone, Debug)]
pub struct MemoryClient {
    data: Bytes,
}

impl MemoryClient {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl ResourceClient for MemoryClient {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn get_range(&self, offset: u64, length: usize) -> Result<Vec<u8>, ResourceError> {
        check_range(offset, length, self.len())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reads_are_errors() {
        let client = MemoryClient::new(vec![0_u8; 16]);
        assert_eq!(client.get_range(8, 8).unwrap().len(), 8);
        assert!(matches!(
            client.get_range(8, 9),
            Err(ResourceError::OutOfBounds { offset: 8, length: 9, len: 16 })
        ));
    }
}
