//! Persisted terrain payload: postcard-encoded [`LandData`], LZ4-compressed
//! with the uncompressed size prepended.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::CodecError;
use crate::terrain::LandData;

/// Serialize and compress a land's terrain for the key-value store.
pub fn encode_land(data: &LandData) -> Result<Vec<u8>, CodecError> {
    let raw = postcard::to_allocvec(data)?;
    Ok(compress_prepend_size(&raw))
}

/// Decompress and deserialize a stored terrain payload.
pub fn decode_land(bytes: &[u8]) -> Result<LandData, CodecError> {
    let raw = decompress_size_prepended(bytes)?;
    Ok(postcard::from_bytes(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::LandCoord;
    use crate::generator::generate_land;

    #[test]
    fn test_generated_land_survives_storage_encoding() {
        let land = generate_land(LandCoord::new(-3, 9), 42);
        let bytes = encode_land(&land).unwrap();
        assert_eq!(decode_land(&bytes).unwrap(), land);
    }

    #[test]
    fn test_payload_prepends_uncompressed_size() {
        let land = generate_land(LandCoord::new(0, 0), 1);
        let raw = postcard::to_allocvec(&land).unwrap();
        let packed = encode_land(&land).unwrap();
        let size = u32::from_le_bytes([packed[0], packed[1], packed[2], packed[3]]);
        assert_eq!(size as usize, raw.len());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_land(&[10, 0, 0, 0, 0xFF]).is_err());
        assert!(decode_land(&[]).is_err());
    }
}
