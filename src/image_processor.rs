//! # Image Processing Module
//!
//! Questo modulo è il `CodecAdapter` di default: tutto il lavoro sui pixel
//! avviene in-process, senza tool esterni.
//!
//! ## Responsabilità:
//! - Lettura dimensioni senza decodifica completa
//! - Decodifica delle sorgenti e resize Lanczos3 per lo small viewport
//! - Encoding verso il formato originale, AVIF e WebP
//!
//! ## Codec:
//!
//! | Formato | Decode | Encode | Libreria |
//! |---------|--------|--------|----------|
//! | JPEG    | ✅     | ✅     | image (con qualità) |
//! | PNG     | ✅     | ✅     | image |
//! | TIFF    | ✅     | ✅     | image |
//! | BMP     | ✅     | ✅     | image |
//! | WebP    | ✅     | ✅     | image (decode), webp/libwebp (encode lossy) |
//! | AVIF    | feature `avif-decode` | ✅ | image + dav1d (decode), ravif (encode) |
//!
//! Senza la feature `avif-decode` le sorgenti AVIF vengono riconosciute ma
//! `decodes("avif")` restituisce false: la pipeline le registra come fallite
//! senza interrompere il resto della conversione.
//!
//! ## Resize:
//! L'altezza viene arrotondata mantenendo l'aspect ratio, minimo un pixel.

use crate::codec::{scaled_height, CodecAdapter, EncodeFormat, ImageMetadata};
use crate::error::CodecError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Default AVIF encoder speed (0 best / slowest, 10 fastest)
pub const DEFAULT_AVIF_SPEED: u8 = 6;

/// In-process codec adapter built on `image`, `ravif` and `webp`
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    avif_speed: u8,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_AVIF_SPEED)
    }
}

impl ImageProcessor {
    pub fn new(avif_speed: u8) -> Self {
        Self {
            avif_speed: avif_speed.clamp(1, 10),
        }
    }

    /// Encode `img` into an in-memory buffer
    fn encode_to_vec(
        &self,
        img: &DynamicImage,
        format: EncodeFormat,
        quality: u8,
    ) -> Result<Vec<u8>, CodecError> {
        match format {
            EncodeFormat::Avif => self.encode_avif(img, quality),
            EncodeFormat::Webp => Ok(encode_webp(img, quality)),
            EncodeFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = img.to_rgb8();
                let mut buf = Vec::new();
                JpegEncoder::new_with_quality(&mut buf, quality).encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ColorType::Rgb8,
                )?;
                Ok(buf)
            }
            EncodeFormat::Png => write_with_format(img, ImageFormat::Png),
            EncodeFormat::Tiff => {
                write_with_format(&DynamicImage::ImageRgba8(img.to_rgba8()), ImageFormat::Tiff)
            }
            EncodeFormat::Bmp => {
                write_with_format(&DynamicImage::ImageRgba8(img.to_rgba8()), ImageFormat::Bmp)
            }
        }
    }

    /// AVIF via ravif (lossy)
    fn encode_avif(&self, img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
        let rgba = img.to_rgba8();
        let (w, h) = (rgba.width() as usize, rgba.height() as usize);

        let pixels: Vec<rgb::RGBA<u8>> = rgba
            .as_raw()
            .chunks_exact(4)
            .map(|chunk| rgb::RGBA::new(chunk[0], chunk[1], chunk[2], chunk[3]))
            .collect();

        let encoded = ravif::Encoder::new()
            .with_quality(quality as f32)
            .with_speed(self.avif_speed)
            .encode_rgba(ravif::Img::new(pixels.as_slice(), w, h))
            .map_err(|e| CodecError::Avif(e.to_string()))?;

        Ok(encoded.avif_file)
    }

    fn ensure_decoder(&self, source: &Path) -> Result<(), CodecError> {
        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.decodes(&extension) {
            Ok(())
        } else {
            Err(CodecError::Unsupported(format!(
                "no {} decoder compiled in: {}",
                extension,
                source.display()
            )))
        }
    }
}

/// WebP via libwebp (lossy)
fn encode_webp(img: &DynamicImage, quality: u8) -> Vec<u8> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    encoder.encode(quality as f32).to_vec()
}

fn write_with_format(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

impl CodecAdapter for ImageProcessor {
    type Handle = DynamicImage;

    fn decodes(&self, extension: &str) -> bool {
        extension != "avif" || cfg!(feature = "avif-decode")
    }

    fn metadata(&self, source: &Path) -> Result<ImageMetadata, CodecError> {
        self.ensure_decoder(source)?;
        let (width, height) = image::image_dimensions(source)?;
        debug!("Got dimensions {}x{} for {}", width, height, source.display());
        Ok(ImageMetadata { width, height })
    }

    fn open(&self, source: &Path) -> Result<DynamicImage, CodecError> {
        self.ensure_decoder(source)?;
        Ok(image::open(source)?)
    }

    fn resize(&self, handle: &DynamicImage, width: u32) -> Result<DynamicImage, CodecError> {
        let height = scaled_height(handle.width(), handle.height(), width);
        Ok(handle.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn encode(
        &self,
        handle: &DynamicImage,
        format: EncodeFormat,
        quality: u8,
        dest: &Path,
    ) -> Result<u64, CodecError> {
        let bytes = self.encode_to_vec(handle, format, quality)?;
        std::fs::write(dest, &bytes)?;
        debug!("Wrote {} ({} bytes)", dest.display(), bytes.len());
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn test_metadata_reads_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        gradient(40, 20).save(&path).unwrap();

        let meta = ImageProcessor::default().metadata(&path).unwrap();
        assert_eq!(meta, ImageMetadata { width: 40, height: 20 });
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let processor = ImageProcessor::default();
        let resized = processor.resize(&gradient(40, 20), 16).unwrap();
        assert_eq!((resized.width(), resized.height()), (16, 8));
    }

    #[test]
    fn test_encode_every_format() {
        let temp_dir = TempDir::new().unwrap();
        let processor = ImageProcessor::new(10);
        let img = gradient(8, 8);

        for (format, name) in [
            (EncodeFormat::Jpeg, "index.jpg"),
            (EncodeFormat::Png, "index.png"),
            (EncodeFormat::Webp, "index.webp"),
            (EncodeFormat::Avif, "index.avif"),
            (EncodeFormat::Tiff, "index.tiff"),
            (EncodeFormat::Bmp, "index.bmp"),
        ] {
            let dest = temp_dir.path().join(name);
            let size = processor.encode(&img, format, 70, &dest).unwrap();
            assert!(size > 0, "{:?} produced no bytes", format);
            assert_eq!(std::fs::metadata(&dest).unwrap().len(), size);
        }
    }

    #[test]
    fn test_encoded_jpeg_decodes_back() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("index.jpg");
        ImageProcessor::default()
            .encode(&gradient(12, 6), EncodeFormat::Jpeg, 80, &dest)
            .unwrap();
        assert_eq!(image::image_dimensions(&dest).unwrap(), (12, 6));
    }

    #[cfg(not(feature = "avif-decode"))]
    #[test]
    fn test_avif_source_needs_decoder_feature() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.avif");
        std::fs::write(&path, b"not really avif").unwrap();

        let processor = ImageProcessor::default();
        assert!(!processor.decodes("avif"));
        assert!(processor.decodes("png"));
        assert!(matches!(processor.open(&path), Err(CodecError::Unsupported(_))));
        assert!(matches!(processor.metadata(&path), Err(CodecError::Unsupported(_))));
    }

    #[cfg(feature = "avif-decode")]
    #[test]
    fn test_avif_source_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.avif");
        let processor = ImageProcessor::new(10);
        processor.encode(&gradient(16, 8), EncodeFormat::Avif, 80, &path).unwrap();

        assert!(processor.decodes("avif"));
        assert_eq!(processor.metadata(&path).unwrap(), ImageMetadata { width: 16, height: 8 });
        let decoded = processor.open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_corrupt_source_fails_to_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        std::fs::write(&path, b"garbage").unwrap();

        assert!(ImageProcessor::default().open(&path).is_err());
        assert!(ImageProcessor::default().metadata(&path).is_err());
    }
}
