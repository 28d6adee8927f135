use crate::core::fingerprint::Fingerprint;
use image::ImageReader;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::path::Path;
use thiserror::Error;

/// Side length of the hash grid; fingerprints are `HASH_SIZE * HASH_SIZE` bits.
pub const HASH_SIZE: u32 = 8;
pub const FINGERPRINT_BITS: usize = (HASH_SIZE * HASH_SIZE) as usize;

pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
pub const RASTER_EXTENSIONS: &[&str] = &["png", "gif", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("failed to open {identifier}: {source}")]
    Open {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {identifier}: {source}")]
    Decode {
        identifier: String,
        #[source]
        source: image::ImageError,
    },

    #[error("no hasher available for file: {identifier}")]
    Unsupported { identifier: String },

    #[error("fingerprinting {identifier} panicked")]
    Panicked { identifier: String },
}

impl FingerprintError {
    /// The image the error refers to.
    pub fn identifier(&self) -> &str {
        match self {
            FingerprintError::Open { identifier, .. }
            | FingerprintError::Decode { identifier, .. }
            | FingerprintError::Unsupported { identifier }
            | FingerprintError::Panicked { identifier } => identifier,
        }
    }
}

/// A fingerprinting strategy for some family of image files.
pub trait ImageHasher: Send + Sync {
    fn name(&self) -> &str;

    fn can_hash(&self, path: &Path) -> bool;

    fn hash(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;
}

/// DCT perceptual hash: grayscale thumbnail, DCT, bits set where a
/// coefficient exceeds the median.
pub struct PerceptualHasher {
    name: &'static str,
    extensions: &'static [&'static str],
    hasher: Hasher,
}

impl PerceptualHasher {
    pub fn new(name: &'static str, extensions: &'static [&'static str]) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(HASH_SIZE, HASH_SIZE)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();

        Self {
            name,
            extensions,
            hasher,
        }
    }

    pub fn jpeg() -> Self {
        Self::new("jpeg", JPEG_EXTENSIONS)
    }

    pub fn raster() -> Self {
        Self::new("raster", RASTER_EXTENSIONS)
    }
}

impl ImageHasher for PerceptualHasher {
    fn name(&self) -> &str {
        self.name
    }

    fn can_hash(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    fn hash(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let identifier = || path.display().to_string();

        let img = ImageReader::open(path)
            .map_err(|source| FingerprintError::Open {
                identifier: identifier(),
                source,
            })?
            .decode()
            .map_err(|source| FingerprintError::Decode {
                identifier: identifier(),
                source,
            })?;

        let hash = self.hasher.hash_image(&img);
        Ok(Fingerprint::from_bytes(hash.as_bytes(), FINGERPRINT_BITS))
    }
}

/// Ordered list of hashers; the first one that recognizes a file wins.
pub struct HasherRegistry {
    hashers: Vec<Box<dyn ImageHasher>>,
}

impl HasherRegistry {
    pub fn empty() -> Self {
        Self {
            hashers: Vec::new(),
        }
    }

    pub fn with_hasher(mut self, hasher: impl ImageHasher + 'static) -> Self {
        self.hashers.push(Box::new(hasher));
        self
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.hashers.iter().any(|h| h.can_hash(path))
    }

    pub fn hash(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        match self.hashers.iter().find(|h| h.can_hash(path)) {
            Some(hasher) => {
                log::debug!("Computing {} hash for {}", hasher.name(), path.display());
                hasher.hash(path)
            }
            None => {
                log::error!("No hasher available for file: {}", path.display());
                Err(FingerprintError::Unsupported {
                    identifier: path.display().to_string(),
                })
            }
        }
    }
}

impl Default for HasherRegistry {
    fn default() -> Self {
        Self::empty()
            .with_hasher(PerceptualHasher::jpeg())
            .with_hasher(PerceptualHasher::raster())
    }
}
