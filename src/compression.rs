//! Pluggable compression for hand-off frames.
//!
//! Each algorithm is identified by a small numeric ID stored in the frame's
//! meta byte, so a consumer can pick the right decompressor through a
//! [`CompressorRegistry`] without out-of-band configuration.

use crate::error::{PartflowError, Result};
use std::borrow::Cow;

/// Interface for compression algorithms.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Unique ID stored in the frame meta byte. 0 is reserved for no
    /// compression. Only the lower three bits are stored.
    fn id(&self) -> u8;

    /// Compresses the data. May borrow the input when nothing is done.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Reverses [`Compressor::compress`].
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

/// Pass-through (ID 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

#[cfg(feature = "lz4_flex")]
/// LZ4 block compression with a size prefix (ID 1).
///
/// Available when the `lz4_flex` feature is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        1
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let vec = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| PartflowError::Compression(e.to_string()))?;
        Ok(Cow::Owned(vec))
    }
}

/// Maps algorithm IDs to compressors.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Creates a registry holding [`NoCompression`] and, with the `lz4_flex`
    /// feature, the LZ4 compressor.
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..8).map(|_| None).collect(),
        };

        reg.register(Box::new(NoCompression));

        #[cfg(feature = "lz4_flex")]
        reg.register(Box::new(Lz4Compressor));

        reg
    }

    /// Registers a compressor under its ID, replacing any previous one.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = usize::from(algo.id() & 0x07);
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a compressor by its ID.
    ///
    /// # Errors
    /// Returns [`PartflowError::Compression`] if the ID is not registered.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        if let Some(algo) = self
            .algorithms
            .get(usize::from(id))
            .and_then(|opt| opt.as_ref())
        {
            return Ok(algo.as_ref());
        }

        Err(PartflowError::Compression(format!(
            "Algorithm ID {id} is not registered or available"
        )))
    }

    /// The compressor to use for new frames.
    ///
    /// Falls back to [`NoCompression`] when compression is requested but no
    /// compressing algorithm is compiled in.
    pub fn preferred(&self, compress: bool) -> &dyn Compressor {
        if compress && let Ok(algo) = self.get(1) {
            return algo;
        }
        if compress {
            log::warn!("compression requested but no algorithm is available, writing uncompressed frames");
        }
        &NoCompression
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
