//! Hand-off frames.
//!
//! Partition results are handed to consumers running elsewhere (another
//! executor, a later stage, a file on disk) as self-describing frames:
//!
//! ```text
//! [ Magic "PFIO" ] [ Payload ] [ Checksum (u64 LE) ] [ MetaByte ]
//! ```
//!
//! The payload is the bincode encoding of the value, optionally compressed.
//! The checksum is the XxHash64 of the *uncompressed* payload, so two frames
//! of equal values carry equal checksums whatever compressor wrote them. The
//! meta byte holds the compressor ID in its lower three bits.

use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use twox_hash::XxHash64;

use crate::compression::{Compressor, CompressorRegistry};
use crate::error::{PartflowError, Result};

/// Magic bytes at the start of every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PFIO";

/// Bytes of framing around the payload: magic, checksum, meta byte.
pub const FRAME_OVERHEAD: usize = 4 + 8 + 1;

const COMPRESSION_MASK: u8 = 0b0000_0111;

fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| PartflowError::Serialization(e.to_string()))
}

/// XxHash64 of the bincode encoding of `value`.
///
/// Equal values give equal fingerprints, which makes this a cheap way to
/// compare results of separate runs.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<u64> {
    Ok(checksum(&to_payload(value)?))
}

/// Encodes `value` into a frame.
pub fn encode_frame<T: Serialize + ?Sized>(value: &T, compressor: &dyn Compressor) -> Result<Vec<u8>> {
    let payload = to_payload(value)?;
    let compressed = compressor.compress(&payload)?;

    let mut frame = Vec::with_capacity(compressed.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&compressed);
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    frame.push(compressor.id() & COMPRESSION_MASK);
    Ok(frame)
}

/// Decodes a frame written by [`encode_frame`].
///
/// # Errors
/// [`PartflowError::Format`] if the frame is truncated, lacks the magic
/// bytes, or fails its checksum. Compression and bincode errors are
/// propagated.
pub fn decode_frame<T: DeserializeOwned>(frame: &[u8], registry: &CompressorRegistry) -> Result<T> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(PartflowError::Format(format!(
            "frame of {} bytes is shorter than its framing",
            frame.len()
        )));
    }
    let (magic, rest) = frame.split_at(FRAME_MAGIC.len());
    if magic != FRAME_MAGIC {
        return Err(PartflowError::Format("frame does not start with PFIO".into()));
    }

    let (body, meta) = rest.split_at(rest.len() - 1);
    let (compressed, stored) = body.split_at(body.len() - 8);
    let stored = u64::from_le_bytes(
        stored
            .try_into()
            .map_err(|_| PartflowError::Format("truncated checksum".into()))?,
    );

    let compressor = registry.get(meta[0] & COMPRESSION_MASK)?;
    let payload = compressor.decompress(compressed)?;
    if checksum(&payload) != stored {
        return Err(PartflowError::Format("frame checksum mismatch".into()));
    }

    let (value, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())
        .map_err(|e| PartflowError::Serialization(e.to_string()))?;
    Ok(value)
}

/// Writes `value` as a single frame to `path`.
pub fn save<T, P>(path: P, value: &T, compressor: &dyn Compressor) -> Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let frame = encode_frame(value, compressor)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads a frame written by [`save`].
pub fn load<T, P>(path: P, registry: &CompressorRegistry) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut frame = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut frame)?;
    decode_frame(&frame, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::NoCompression;
    use crate::partition_io::ArrayPartitionIO;

    fn sample() -> Result<ArrayPartitionIO<u64>> {
        let mut io = ArrayPartitionIO::new([3, 3], vec![[0, 0], [1, 0]]);
        io.add_output_cell([2, 2], [1, 1], 9)?;
        io.resolve_input_cell([0, 0]);
        Ok(io)
    }

    #[test]
    fn test_frame_layout() -> Result<()> {
        let io = sample()?;
        let frame = encode_frame(&io, &NoCompression)?;
        assert_eq!(&frame[..4], b"PFIO");
        assert_eq!(frame.last(), Some(&0));

        let decoded: ArrayPartitionIO<u64> = decode_frame(&frame, &CompressorRegistry::new())?;
        assert_eq!(decoded, io);
        assert!(decoded.contains_input_cell([1, 0]));
        assert!(!decoded.contains_input_cell([0, 0]));
        Ok(())
    }

    #[test]
    fn test_corruption_detected() -> Result<()> {
        let mut frame = encode_frame(&sample()?, &NoCompression)?;
        frame[5] ^= 0xff;
        let result: Result<ArrayPartitionIO<u64>> = decode_frame(&frame, &CompressorRegistry::new());
        assert!(result.is_err());

        let result: Result<u64> = decode_frame(&frame[..6], &CompressorRegistry::new());
        assert!(matches!(result, Err(PartflowError::Format(_))));
        Ok(())
    }

    #[test]
    fn test_fingerprint_tracks_content() -> Result<()> {
        let a = sample()?;
        let mut b = sample()?;
        assert_eq!(fingerprint(&a)?, fingerprint(&b)?);
        b.resolve_input_cell([1, 0]);
        assert_ne!(fingerprint(&a)?, fingerprint(&b)?);
        Ok(())
    }
}
