use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFingerprintError {
    #[error("invalid bit character {found:?} at position {position}")]
    InvalidBit { position: usize, found: char },
}

/// Fixed-length bit vector summarizing an image.
///
/// Bits are packed most-significant-first into bytes; any padding bits in the
/// final byte are always zero so byte-wise comparisons stay exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl Fingerprint {
    /// Build a fingerprint from packed bytes, keeping the first `bit_len` bits.
    pub fn from_bytes(bytes: &[u8], bit_len: usize) -> Self {
        let byte_len = bit_len.div_ceil(8);
        let mut packed = vec![0u8; byte_len];
        let available = bytes.len().min(byte_len);
        packed[..available].copy_from_slice(&bytes[..available]);

        let tail = bit_len % 8;
        if tail != 0 {
            if let Some(last) = packed.last_mut() {
                *last &= 0xFFu8 << (8 - tail);
            }
        }

        Self {
            bytes: packed,
            bit_len,
        }
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Self {
            bytes,
            bit_len: bits.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bit(&self, index: usize) -> Option<bool> {
        if index >= self.bit_len {
            return None;
        }
        Some(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    /// Number of differing bit positions. Both fingerprints must have the
    /// same length; extra bits on the longer one are ignored.
    pub fn hamming(&self, other: &Fingerprint) -> u32 {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Normalized Hamming distance in `[0, 1]`.
    pub fn distance(&self, other: &Fingerprint) -> f64 {
        if self.bit_len == 0 {
            return 0.0;
        }
        self.hamming(other) as f64 / self.bit_len as f64
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.bit_len {
            let c = if self.bit(i) == Some(true) { '1' } else { '0' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .enumerate()
            .map(|(position, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                found => Err(ParseFingerprintError::InvalidBit { position, found }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_bits(&bits))
    }
}

/// An image identifier paired with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord<I = PathBuf> {
    pub identifier: I,
    pub fingerprint: Fingerprint,
}

impl<I> FingerprintRecord<I> {
    pub fn new(identifier: I, fingerprint: Fingerprint) -> Self {
        Self {
            identifier,
            fingerprint,
        }
    }
}

/// Cluster membership of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Cluster(u32),
    Noise,
}

impl Label {
    pub const NOISE_ID: i64 = -1;

    /// Integer form: the cluster id, or `-1` for noise.
    pub fn id(&self) -> i64 {
        match self {
            Label::Cluster(id) => i64::from(*id),
            Label::Noise => Self::NOISE_ID,
        }
    }

    pub fn cluster_id(&self) -> Option<u32> {
        match self {
            Label::Cluster(id) => Some(*id),
            Label::Noise => None,
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, Label::Noise)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Cluster(id) => write!(f, "group_{}", id),
            Label::Noise => write!(f, "noise"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment<I = PathBuf> {
    pub identifier: I,
    pub label: Label,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let fp: Fingerprint = "1010000011".parse().unwrap();
        assert_eq!(fp.len(), 10);
        assert_eq!(fp.as_bytes(), &[0b1010_0000, 0b1100_0000]);
        assert_eq!(fp.to_string(), "1010000011");
    }

    #[test]
    fn test_parse_rejects_non_bits() {
        let err = "0102".parse::<Fingerprint>().unwrap_err();
        assert_eq!(
            err,
            ParseFingerprintError::InvalidBit {
                position: 2,
                found: '2'
            }
        );
    }

    #[test]
    fn test_from_bytes_masks_padding() {
        let fp = Fingerprint::from_bytes(&[0xFF, 0xFF], 12);
        assert_eq!(fp.as_bytes(), &[0xFF, 0xF0]);
        assert_eq!(fp.bit(11), Some(true));
        assert_eq!(fp.bit(12), None);

        let zeros = Fingerprint::from_bytes(&[0x00, 0x00], 12);
        assert_eq!(fp.hamming(&zeros), 12);
    }

    #[test]
    fn test_normalized_distance() {
        let a: Fingerprint = "00000000".parse().unwrap();
        let b: Fingerprint = "11111111".parse().unwrap();
        let c: Fingerprint = "00000011".parse().unwrap();

        assert_eq!(a.distance(&a), 0.0);
        assert_eq!(a.distance(&b), 1.0);
        assert_eq!(a.distance(&c), 0.25);
        assert_eq!(c.distance(&a), 0.25);
    }

    #[test]
    fn test_empty_fingerprints_have_zero_distance() {
        let a = Fingerprint::from_bits(&[]);
        assert!(a.is_empty());
        assert_eq!(a.distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_label_ids() {
        assert_eq!(Label::Cluster(3).id(), 3);
        assert_eq!(Label::Noise.id(), -1);
        assert_eq!(Label::Cluster(0).to_string(), "group_0");
        assert!(Label::Noise.is_noise());
        assert_eq!(Label::Noise.cluster_id(), None);
    }
}
