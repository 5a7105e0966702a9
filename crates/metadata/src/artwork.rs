use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageError, RgbImage};
use tracing::{debug, warn};

pub const DEFAULT_THUMBNAIL_SIZES: [u32; 4] = [128, 256, 512, 1024];
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailSpec {
    pub sizes: Vec<u32>,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_THUMBNAIL_SIZES.to_vec(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// `Absent` and `DecodeFailed` persist the same way; they stay distinct so
/// callers can count undecodable covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverStatus {
    Absent,
    Decoded { width: u32, height: u32 },
    DecodeFailed(String),
}

#[derive(Debug, Clone)]
pub struct CoverSet {
    pub status: CoverStatus,
    pub original: Vec<u8>,
    /// One entry per requested size, in request order; empty where skipped.
    pub thumbnails: Vec<Vec<u8>>,
}

impl CoverSet {
    fn empty(status: CoverStatus, slots: usize) -> Self {
        Self {
            status,
            original: Vec::new(),
            thumbnails: vec![Vec::new(); slots],
        }
    }

    pub fn has_cover(&self) -> bool {
        matches!(self.status, CoverStatus::Decoded { .. })
    }

    pub fn thumbnail(&self, index: usize) -> Vec<u8> {
        self.thumbnails.get(index).cloned().unwrap_or_default()
    }
}

pub fn generate_thumbnails(cover: &[u8], spec: &ThumbnailSpec) -> CoverSet {
    if cover.is_empty() {
        return CoverSet::empty(CoverStatus::Absent, spec.sizes.len());
    }

    let original = match image::load_from_memory(cover) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(err) => {
            warn!("Failed to decode cover ({} bytes): {}", cover.len(), err);
            return CoverSet::empty(CoverStatus::DecodeFailed(err.to_string()), spec.sizes.len());
        }
    };
    let (width, height) = original.dimensions();

    let mut thumbnails = Vec::with_capacity(spec.sizes.len());
    for &size in &spec.sizes {
        let bytes = match scaled_dimensions(width, height, size) {
            Some((nw, nh)) => match encode_thumbnail(&original, nw, nh, spec.jpeg_quality) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("Failed to encode {}px thumbnail: {}", size, err);
                    Vec::new()
                }
            },
            None => {
                debug!("Skipping {}px thumbnail for {}x{} cover", size, width, height);
                Vec::new()
            }
        };
        thumbnails.push(bytes);
    }

    CoverSet {
        status: CoverStatus::Decoded { width, height },
        original: cover.to_vec(),
        thumbnails,
    }
}

/// Longer edge becomes `target`; `None` when that would enlarge either axis.
pub fn scaled_dimensions(width: u32, height: u32, target: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (nw, nh) = if width > height {
        let nh = u64::from(target) * u64::from(height) / u64::from(width);
        (target, nh as u32)
    } else {
        let nw = u64::from(target) * u64::from(width) / u64::from(height);
        (nw as u32, target)
    };
    if nw <= width && nh <= height {
        Some((nw.max(1), nh.max(1)))
    } else {
        None
    }
}

fn encode_thumbnail(
    original: &RgbImage,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let resized = image::imageops::resize(original, width, height, FilterType::Triangle);
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(&resized)?;
    Ok(out)
}
