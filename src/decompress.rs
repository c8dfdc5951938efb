use crate::metadata::CopcConfig;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecompressError {
    #[error("No LAZ decompressor available, enable the `laz` feature or supply one")]
    Unavailable,

    #[error("The file has no laszip VLR")]
    MissingLazVlr,

    #[error("Chunk holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Turns one compressed chunk into `point_count` raw point records.
pub trait PointDecompressor: Debug + Send + Sync {
    fn decompress(
        &self,
        compressed: &[u8],
        point_count: usize,
        record_length: usize,
    ) -> Result<Vec<u8>, DecompressError>;
}

/// Chunks stored as plain point records.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawDecompressor;

impl PointDecompressor for RawDecompressor {
    fn decompress(
        &self,
        compressed: &[u8],
        point_count: usize,
        record_length: usize,
    ) -> Result<Vec<u8>, DecompressError> {
        let expected = point_count * record_length;
        if compressed.len() != expected {
            return Err(DecompressError::SizeMismatch {
                expected,
                actual: compressed.len(),
            });
        }
        Ok(compressed.to_vec())
    }
}

/// Stand-in used when the crate is built without a LAZ codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecompressor;

impl PointDecompressor for NoDecompressor {
    fn decompress(&self, _: &[u8], _: usize, _: usize) -> Result<Vec<u8>, DecompressError> {
        Err(DecompressError::Unavailable)
    }
}

#[cfg(feature = "laz")]
pub use self::lazrs::LazDecompressor;

#[cfg(feature = "laz")]
mod lazrs {
    use super::{DecompressError, PointDecompressor};
    use laz::record::{LayeredPointRecordDecompressor, RecordDecompressor};
    use laz::LazVlr;
    use std::io::Cursor;

    /// Decodes COPC chunks with the `laz` crate. Every chunk is an independent
    /// layered LAZ chunk, so no chunk table is needed.
    #[derive(Debug)]
    pub struct LazDecompressor {
        vlr: LazVlr,
    }

    impl LazDecompressor {
        pub fn new(laz_vlr: &[u8]) -> Result<Self, DecompressError> {
            let vlr = LazVlr::from_buffer(laz_vlr).map_err(|e| DecompressError::Codec(e.to_string()))?;
            Ok(Self { vlr })
        }
    }

    impl PointDecompressor for LazDecompressor {
        fn decompress(
            &self,
            compressed: &[u8],
            point_count: usize,
            record_length: usize,
        ) -> Result<Vec<u8>, DecompressError> {
            let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(compressed));
            decompressor
                .set_fields_from(self.vlr.items())
                .map_err(|e| DecompressError::Codec(e.to_string()))?;

            let mut decompressed = vec![0_u8; point_count * record_length];
            decompressor
                .decompress_many(&mut decompressed)
                .map_err(|e| DecompressError::Codec(e.to_string()))?;

            Ok(decompressed)
        }
    }
}

/// The codec a freshly opened reader uses.
#[cfg(feature = "laz")]
pub fn default_decompressor(config: &CopcConfig) -> Result<Box<dyn PointDecompressor>, DecompressError> {
    if !config.header.is_compressed() {
        return Ok(Box::new(RawDecompressor));
    }
    let vlr = config.laz_vlr.as_deref().ok_or(DecompressError::MissingLazVlr)?;
    Ok(Box::new(LazDecompressor::new(vlr)?))
}

/// The codec a freshly opened reader uses.
#[cfg(not(feature = "laz"))]
pub fn default_decompressor(config: &CopcConfig) -> Result<Box<dyn PointDecompressor>, DecompressError> {
    if !config.header.is_compressed() {
        return Ok(Box::new(RawDecompressor));
    }
    Ok(Box::new(NoDecompressor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_chunks_must_match_their_size() {
        let chunk = vec![7_u8; 60];
        assert_eq!(RawDecompressor.decompress(&chunk, 2, 30).unwrap(), chunk);
        assert!(matches!(
            RawDecompressor.decompress(&chunk, 3, 30),
            Err(DecompressError::SizeMismatch {
                expected: 90,
                actual: 60
            })
        ));
    }

    #[test]
    fn no_decompressor_always_fails() {
        assert!(matches!(
            NoDecompressor.decompress(&[1, 2, 3], 1, 30),
            Err(DecompressError::Unavailable)
        ));
    }
}
