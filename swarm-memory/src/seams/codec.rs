//! Value codec seam.
//!
//! Write path: JSON bytes → encrypt → compress. Read path is the inverse.
//! Both transforms default to identity; the manager never depends on them
//! doing anything.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MemoryError, MemoryResult};

pub trait CompressionCodec: Send + Sync {
    fn compress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>>;

    fn decompress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>>;

    /// Codec name for logging.
    fn name(&self) -> &str;
}

pub trait EncryptionCodec: Send + Sync {
    fn encrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>>;

    fn decrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>>;

    /// Codec name for logging.
    fn name(&self) -> &str;

    /// Release key material. Called last during shutdown.
    fn close(&self) {}
}

/// Pass-through codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl CompressionCodec for IdentityCodec {
    fn compress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
        Ok(data)
    }

    fn decompress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
        Ok(data)
    }

    fn name(&self) -> &str {
        "identity"
    }
}

impl EncryptionCodec for IdentityCodec {
    fn encrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
        Ok(data)
    }

    fn decrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
        Ok(data)
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Encoded payload plus the transforms that were applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedValue {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    pub encrypted: bool,
}

/// Serializes values and runs them through the configured codecs.
#[derive(Clone)]
pub struct ValueCodec {
    compression: Arc<dyn CompressionCodec>,
    encryption: Arc<dyn EncryptionCodec>,
    compression_enabled: bool,
    encryption_enabled: bool,
}

impl ValueCodec {
    pub fn new(
        compression: Arc<dyn CompressionCodec>,
        encryption: Arc<dyn EncryptionCodec>,
        compression_enabled: bool,
        encryption_enabled: bool,
    ) -> Self {
        Self {
            compression,
            encryption,
            compression_enabled,
            encryption_enabled,
        }
    }

    /// Identity codecs, both transforms disabled.
    pub fn identity() -> Self {
        Self::new(Arc::new(IdentityCodec), Arc::new(IdentityCodec), false, false)
    }

    /// Encode `value`. `compress` is the partition's opt-in; compression
    /// only happens if it is also enabled globally.
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        compress: bool,
    ) -> MemoryResult<EncodedValue> {
        let mut bytes = serde_json::to_vec(value)?;
        if self.encryption_enabled {
            bytes = self.encryption.encrypt(bytes)?;
        }
        let compressed = compress && self.compression_enabled;
        if compressed {
            bytes = self.compression.compress(bytes)?;
        }
        Ok(EncodedValue {
            bytes,
            compressed,
            encrypted: self.encryption_enabled,
        })
    }

    /// Decode bytes produced by [`ValueCodec::encode`].
    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        compressed: bool,
        encrypted: bool,
    ) -> MemoryResult<T> {
        let mut bytes = bytes.to_vec();
        if compressed {
            bytes = self.compression.decompress(bytes)?;
        }
        if encrypted {
            bytes = self.encryption.decrypt(bytes)?;
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| MemoryError::Codec(format!("payload is not valid JSON: {}", e)))
    }

    pub fn compression_name(&self) -> &str {
        self.compression.name()
    }

    pub fn encryption_name(&self) -> &str {
        self.encryption.name()
    }

    pub fn close(&self) {
        self.encryption.close();
    }
}

impl std::fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodec")
            .field("compression", &self.compression.name())
            .field("encryption", &self.encryption.name())
            .field("compression_enabled", &self.compression_enabled)
            .field("encryption_enabled", &self.encryption_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    /// Reversible byte transform standing in for a real cipher.
    struct XorCodec(u8);

    impl EncryptionCodec for XorCodec {
        fn encrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
            Ok(data.into_iter().map(|b| b ^ self.0).collect())
        }

        fn decrypt(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
            self.encrypt(data)
        }

        fn name(&self) -> &str {
            "xor"
        }
    }

    /// Run-length encoding as a stand-in compressor.
    struct RleCodec;

    impl CompressionCodec for RleCodec {
        fn compress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
            let mut out = Vec::new();
            let mut iter = data.into_iter().peekable();
            while let Some(b) = iter.next() {
                let mut run = 1u8;
                while run < u8::MAX && iter.peek() == Some(&b) {
                    iter.next();
                    run += 1;
                }
                out.extend([run, b]);
            }
            Ok(out)
        }

        fn decompress(&self, data: Vec<u8>) -> MemoryResult<Vec<u8>> {
            if data.len() % 2 != 0 {
                return Err(MemoryError::Codec("truncated rle stream".to_string()));
            }
            Ok(data
                .chunks(2)
                .flat_map(|pair| std::iter::repeat(pair[1]).take(pair[0] as usize))
                .collect())
        }

        fn name(&self) -> &str {
            "rle"
        }
    }

    #[test]
    fn test_identity_is_plain_json() {
        let codec = ValueCodec::identity();
        let encoded = codec.encode(&json!({"a": 1}), true).unwrap();
        assert_eq!(encoded.bytes, br#"{"a":1}"#);
        assert!(!encoded.compressed);
        assert!(!encoded.encrypted);
    }

    #[test]
    fn test_encrypt_then_compress_round_trip() {
        let codec = ValueCodec::new(Arc::new(RleCodec), Arc::new(XorCodec(0x5a)), true, true);
        let value = json!({"payload": "aaaaaaaaaaaaaaaaaaaaaaaa", "n": [1, 2, 3]});

        let encoded = codec.encode(&value, true).unwrap();
        assert!(encoded.compressed);
        assert!(encoded.encrypted);
        assert_ne!(encoded.bytes, serde_json::to_vec(&value).unwrap());

        let decoded: Value = codec
            .decode(&encoded.bytes, encoded.compressed, encoded.encrypted)
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_partition_opt_in_required_for_compression() {
        let codec = ValueCodec::new(Arc::new(RleCodec), Arc::new(IdentityCodec), true, false);
        let encoded = codec.encode(&json!("x"), false).unwrap();
        assert!(!encoded.compressed);
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let codec = ValueCodec::identity();
        let err = codec.decode::<Value>(b"not json", false, false).unwrap_err();
        assert!(matches!(err, MemoryError::Codec(_)));
    }
}
