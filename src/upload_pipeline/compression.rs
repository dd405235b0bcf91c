//! Image normalization before transfer.
//!
//! Eligible images are turned upright, downscaled to a bounded resolution and
//! re-encoded as JPEG with a size-dependent quality. RAW files, small files and
//! non-images pass through.

use crate::config::CompressionSettings;
use crate::logging::{log_debug, log_info, PIPELINE_COMPONENT};
use crate::upload_pipeline::types::{RawFile, StagedFile};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

pub const NORMALIZED_MIME: &str = "image/jpeg";
pub const NORMALIZED_EXTENSION: &str = "jpg";

pub struct Compressor {
    settings: CompressionSettings,
    /// Name for each re-encoded file, by request index
    normalized_names: HashMap<usize, String>,
}

impl Compressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            settings,
            normalized_names: HashMap::new(),
        }
    }

    /// Compressor for one request. A re-encoded file never takes the name of
    /// another file in `files`, nor of another re-encoded file.
    pub fn for_files(settings: CompressionSettings, files: &[RawFile]) -> Self {
        let mut compressor = Self::new(settings);
        let mut taken: HashSet<String> = files.iter().map(|f| f.name.to_lowercase()).collect();

        for (index, file) in files.iter().enumerate() {
            if !compressor.is_eligible(file) {
                continue;
            }
            let name = unique_name(&file.name, &taken);
            taken.insert(name.to_lowercase());
            compressor.normalized_names.insert(index, name);
        }
        compressor
    }

    /// Whether the file would be re-encoded at all
    pub fn is_eligible(&self, file: &RawFile) -> bool {
        !file.is_raw()
            && file.size() > self.settings.small_file_bytes
            && file.mime_type.starts_with("image/")
    }

    /// Quality for an input of `size` bytes: base, then lowered past each threshold
    pub fn quality_for(&self, size: u64) -> u8 {
        if size > self.settings.huge_file_bytes {
            self.settings.huge_file_quality
        } else if size > self.settings.large_file_bytes {
            self.settings.large_file_quality
        } else {
            self.settings.base_quality
        }
    }

    /// Stage one file from its loaded `data`. Never fails: any decode/encode
    /// problem yields the original bytes.
    pub fn compress(&self, index: usize, file: &RawFile, data: Bytes) -> StagedFile {
        if !self.is_eligible(file) {
            return StagedFile::passthrough(index, file, data);
        }

        let original_size = data.len() as u64;
        let encoded = match self.reencode(&data, original_size) {
            Ok(encoded) => encoded,
            Err(e) => {
                log_debug(
                    PIPELINE_COMPONENT,
                    &format!("Compression skipped for {}: {}", file.name, e),
                )
                .unwrap_or_default();
                return StagedFile::passthrough(index, file, data);
            }
        };

        let new_size = encoded.len() as u64;
        if new_size >= original_size {
            log_debug(
                PIPELINE_COMPONENT,
                &format!(
                    "Re-encoding {} would not shrink it ({} -> {} bytes), keeping original",
                    file.name, original_size, new_size
                ),
            )
            .unwrap_or_default();
            return StagedFile::passthrough(index, file, data);
        }

        let reduction = 100.0 * (original_size - new_size) as f64 / original_size as f64;
        log_info(
            PIPELINE_COMPONENT,
            &format!(
                "Compressed {}: {} -> {} bytes ({:.1}% smaller)",
                file.name, original_size, new_size, reduction
            ),
        )
        .unwrap_or_default();

        let file_name = self
            .normalized_names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| normalized_name(&file.name));

        StagedFile {
            original_name: file.name.clone(),
            file_name,
            byte_size: new_size,
            mime_type: NORMALIZED_MIME.to_string(),
            payload: encoded.into(),
            index,
        }
    }

    fn reencode(&self, data: &[u8], original_size: u64) -> Result<Vec<u8>, String> {
        let mut decoder = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| format!("Failed to read image: {}", e))?
            .into_decoder()
            .map_err(|e| format!("Failed to decode image: {}", e))?;
        // The pixels are stored as shot; the camera's rotation lives in EXIF
        let orientation = decoder
            .orientation()
            .map_err(|e| format!("Failed to read orientation: {}", e))?;
        let mut img = DynamicImage::from_decoder(decoder)
            .map_err(|e| format!("Failed to decode image: {}", e))?;
        img.apply_orientation(orientation);

        let rgb = self.downscale(img).to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality_for(original_size))
            .encode_image(&rgb)
            .map_err(|e| format!("Failed to encode JPEG: {}", e))?;
        Ok(out)
    }

    fn downscale(&self, img: DynamicImage) -> DynamicImage {
        let max = self.settings.max_dimension;
        let (width, height) = img.dimensions();
        if width <= max && height <= max {
            return img;
        }
        // resize() keeps the aspect ratio and fits inside max x max
        img.resize(max, max, FilterType::Lanczos3)
    }
}

/// Swap the extension for the normalized one ("IMG_1.png" -> "IMG_1.jpg")
fn normalized_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.{}", stem, NORMALIZED_EXTENSION),
        _ => format!("{}.{}", name, NORMALIZED_EXTENSION),
    }
}

/// Normalized name for `name`, suffixed "-1", "-2", ... while it is in `taken`.
/// `taken` holds lowercased names; a file may keep its own name.
fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    let candidate = normalized_name(name);
    if candidate.eq_ignore_ascii_case(name) || !taken.contains(&candidate.to_lowercase()) {
        return candidate;
    }

    let stem = candidate
        .strip_suffix(&format!(".{}", NORMALIZED_EXTENSION))
        .unwrap_or(&candidate);
    let mut n = 1;
    loop {
        let next = format!("{}-{}.{}", stem, n, NORMALIZED_EXTENSION);
        if !taken.contains(&next.to_lowercase()) {
            return next;
        }
        n += 1;
    }
}
