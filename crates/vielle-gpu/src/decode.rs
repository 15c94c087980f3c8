// SPDX-License-Identifier: CEPL-1.0
use crate::error::{GpuError, Result};
use crate::image::PixelData;
use std::path::Path;
use tracing::debug;

/// An image file decoded to tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = ::image::open(path)
            .map_err(|source| GpuError::DecodeImage {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();
        let (width, height) = decoded.dimensions();
        debug!("decoded {}: {width}x{height}", path.display());
        Ok(DecodedImage {
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }

    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "RGBA8 buffer does not match {width}x{height}"
        );
        DecodedImage {
            width,
            height,
            pixels,
        }
    }

    pub fn pixels(&self) -> PixelData<'_> {
        PixelData::rgba8(&self.pixels, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_decodes_to_rgba8() {
        let path = std::env::temp_dir().join(format!("vielle-decode-{}.png", std::process::id()));
        let rgb = ::image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 0, 255]).unwrap();
        rgb.save(&path).unwrap();

        let decoded = DecodedImage::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.pixels, [255, 0, 0, 255, 0, 0, 255, 255]);
        assert_eq!(decoded.pixels().byte_len(), 8);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DecodedImage::load("does/not/exist.png").unwrap_err();
        match err {
            GpuError::DecodeImage { path, .. } => assert!(path.ends_with("exist.png")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn short_buffer_rejected() {
        DecodedImage::from_rgba8(2, 2, vec![0; 12]);
    }
}
