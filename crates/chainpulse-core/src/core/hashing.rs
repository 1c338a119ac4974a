// crates/chainpulse-core/src/core/hashing.rs
// ============================================================================
// Module: ChainPulse Hashing
// Description: Keccak-256 content digests, RFC 8785 canonical JSON, and hex codecs.
// Purpose: Provide the digest primitives shared by ledger, pipeline, and stores.
// Dependencies: serde, serde_jcs, sha2, tiny-keccak
// ============================================================================

//! ## Overview
//! Content hashes committed to the ledger are keccak-256 digests (the Ethereum
//! variant, not SHA3-256 padding) rendered as `0x`-prefixed lowercase hex.
//! RFC 8785 (JCS) canonical JSON is used for audit digests and for store row
//! integrity, where SHA-256 remains the default algorithm.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tiny_keccak::Hasher;
use tiny_keccak::Keccak;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for ChainPulse artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing (store row integrity).
    Sha256,
    /// Keccak-256 hashing (ledger content hashes).
    Keccak256,
}

impl HashAlgorithm {
    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Keccak256 => "keccak256",
        }
    }

    /// Parses a stable algorithm label.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnknownAlgorithm`] for unrecognized labels.
    pub fn from_label(label: &str) -> Result<Self, HashError> {
        match label {
            "sha256" => Ok(Self::Sha256),
            "keccak256" => Ok(Self::Keccak256),
            other => Err(HashError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Default hash algorithm for store integrity digests.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Algorithm-tagged digest representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes (no prefix).
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing digests or decoding hex values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Hex input was malformed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// Decoded value had the wrong byte length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// Algorithm label was not recognized.
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
        HashAlgorithm::Keccak256 => HashDigest::new(HashAlgorithm::Keccak256, &keccak256(bytes)),
    }
}

/// Computes the Ethereum keccak-256 digest of `bytes`.
#[must_use]
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut out);
    out
}

// ============================================================================
// SECTION: 32-Byte Hash Types
// ============================================================================

/// Declares a 32-byte hash newtype rendered as `0x`-prefixed lowercase hex.
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wraps raw digest bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the raw digest bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Returns the `0x`-prefixed lowercase hex form.
            #[must_use]
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex_encode(&self.0))
            }

            /// Parses a hex string with or without the `0x` prefix.
            ///
            /// # Errors
            ///
            /// Returns [`HashError`] when the input is not 32 bytes of hex.
            pub fn parse_hex(value: &str) -> Result<Self, HashError> {
                let bytes = decode_hex_fixed::<32>(value)?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = HashError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::parse_hex(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse_hex(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

hash32_newtype!(
    /// Keccak-256 digest of an insight's canonical bytes, as stored on the ledger.
    ContentHash
);

hash32_newtype!(
    /// Transaction reference returned by a finalized ledger commit.
    TxHash
);

impl ContentHash {
    /// Hashes arbitrary content bytes with keccak-256.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(keccak256(content))
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Decodes a hex string (optional `0x` prefix, either case) into exactly `N` bytes.
///
/// # Errors
///
/// Returns [`HashError`] when the input is malformed or has the wrong length.
pub fn decode_hex_fixed<const N: usize>(value: &str) -> Result<[u8; N], HashError> {
    let trimmed = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    if trimmed.len() % 2 != 0 {
        return Err(HashError::InvalidHex("odd number of hex digits".to_string()));
    }
    let actual = trimmed.len() / 2;
    if actual != N {
        return Err(HashError::InvalidLength {
            expected: N,
            actual,
        });
    }
    let mut out = [0u8; N];
    for (index, pair) in trimmed.as_bytes().chunks_exact(2).enumerate() {
        let high = hex_nibble(pair[0])?;
        let low = hex_nibble(pair[1])?;
        out[index] = (high << 4) | low;
    }
    Ok(out)
}

/// Decodes a single ASCII hex digit.
fn hex_nibble(digit: u8) -> Result<u8, HashError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(HashError::InvalidHex(format!("unexpected character '{}'", char::from(other).escape_default()))),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
