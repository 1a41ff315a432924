use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, RgbImage};
use ndarray::Array4;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Serialize)]
pub struct ImageDetails {
    pub width: u32,
    pub height: u32,
    pub mode: String,
    pub format: String,
}

/// A decoded upload. The original bytes are kept for remote backends.
#[derive(Clone)]
pub struct Upload {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub format: ImageFormat,
    pub details: ImageDetails,
    pub image: Arc<DynamicImage>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn decode(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyUpload);
        }

        let reader = ImageReader::new(Cursor::new(&bytes[..])).with_guessed_format()?;
        let format = match reader.format() {
            Some(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
            _ => return Err(Error::UnsupportedFormat),
        };
        let image = reader.decode()?;

        let (width, height) = image.dimensions();
        let details = ImageDetails {
            width,
            height,
            mode: if format == ImageFormat::Png && is_palette_png(&bytes) {
                "P".to_string()
            } else {
                color_mode(image.color())
            },
            format: format_name(format).to_string(),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            file_name,
            format,
            details,
            image: Arc::new(image),
            bytes,
        })
    }

    /// Decodes on the blocking pool so large images don't stall request workers.
    pub async fn decode_blocking(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self> {
        actix_web::web::block(move || Self::decode(bytes, file_name)).await?
    }

    pub fn mime_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        _ => "JPEG",
    }
}

/// Indexed PNGs are expanded to RGB(A) on decode, so the colour type is read
/// from the IHDR chunk instead.
fn is_palette_png(bytes: &[u8]) -> bool {
    bytes.get(12..16) == Some(&b"IHDR"[..]) && bytes.get(25) == Some(&3)
}

fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 | ColorType::L16 => "L".to_string(),
        ColorType::La8 | ColorType::La16 => "LA".to_string(),
        ColorType::Rgb8 | ColorType::Rgb16 => "RGB".to_string(),
        ColorType::Rgba8 | ColorType::Rgba16 => "RGBA".to_string(),
        other => format!("{:?}", other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Resize to a square, ignoring aspect ratio
    #[default]
    Stretch,
    /// Fit inside the square and pad the rest with black
    Letterbox,
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    pub size: u32,
    pub resize: ResizeMode,
}

impl Preprocessor {
    pub fn new(size: u32, resize: ResizeMode) -> Self {
        Self { size, resize }
    }

    /// Channel-first `(1, 3, size, size)` tensor normalized with ImageNet statistics.
    pub fn tensor(&self, image: &DynamicImage) -> Array4<f32> {
        let resized = self.resize(image);
        let size = self.size as usize;

        Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let pixel = resized.get_pixel(x as u32, y as u32);
            (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c]
        })
    }

    fn resize(&self, image: &DynamicImage) -> RgbImage {
        let size = self.size;
        match self.resize {
            ResizeMode::Stretch => image.resize_exact(size, size, FilterType::Triangle).to_rgb8(),
            ResizeMode::Letterbox => {
                let fitted = image.resize(size, size, FilterType::Triangle).to_rgb8();
                let (fitted_width, fitted_height) = fitted.dimensions();

                let pad_x = (size - fitted_width) / 2;
                let pad_y = (size - fitted_height) / 2;

                let mut canvas = RgbImage::new(size, size);
                for y in 0..fitted_height {
                    for x in 0..fitted_width {
                        canvas.put_pixel(x + pad_x, y + pad_y, *fitted.get_pixel(x, y));
                    }
                }
                canvas
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{ImageOutputFormat, Rgb};

    pub(crate) fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    pub(crate) fn white_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        encode(&DynamicImage::ImageRgb8(image), ImageOutputFormat::Png)
    }

    #[test]
    fn decode_png_records_details() {
        let upload = Upload::decode(white_png(40, 20), Some("fish.png".into())).unwrap();
        assert_eq!(upload.format, ImageFormat::Png);
        assert_eq!(upload.mime_type(), "image/png");
        assert_eq!(upload.details.width, 40);
        assert_eq!(upload.details.height, 20);
        assert_eq!(upload.details.mode, "RGB");
        assert_eq!(upload.details.format, "PNG");
        assert_eq!(upload.file_name.as_deref(), Some("fish.png"));
    }

    #[test]
    fn decode_jpeg() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let upload = Upload::decode(encode(&image, ImageOutputFormat::Jpeg(90)), None).unwrap();
        assert_eq!(upload.format, ImageFormat::Jpeg);
        assert_eq!(upload.mime_type(), "image/jpeg");
    }

    #[test]
    fn decode_rejects_other_formats() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let bmp = encode(&image, ImageOutputFormat::Bmp);
        assert!(matches!(Upload::decode(bmp, None), Err(Error::UnsupportedFormat)));
        assert!(matches!(
            Upload::decode(b"not an image".to_vec(), None),
            Err(Error::UnsupportedFormat)
        ));
        assert!(matches!(Upload::decode(Vec::new(), None), Err(Error::EmptyUpload)));
    }

    #[test]
    fn color_modes_follow_decoded_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
        let upload = Upload::decode(encode(&gray, ImageOutputFormat::Png), None).unwrap();
        assert_eq!(upload.details.mode, "L");

        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::new(4, 4));
        let upload = Upload::decode(encode(&rgba, ImageOutputFormat::Png), None).unwrap();
        assert_eq!(upload.details.mode, "RGBA");
    }

    #[test]
    fn palette_png_detected_from_header() {
        let mut png = white_png(4, 4);
        assert!(!is_palette_png(&png));

        // IHDR colour type byte: 2 is truecolour, 3 is indexed.
        assert_eq!(png[25], 2);
        png[25] = 3;
        assert!(is_palette_png(&png));

        assert!(!is_palette_png(b"\x89PNG"));
        let jpeg = encode(
            &DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
            ImageOutputFormat::Jpeg(90),
        );
        assert!(!is_palette_png(&jpeg));
    }

    #[actix_web::test]
    async fn decode_blocking_matches_decode() {
        let upload = Upload::decode_blocking(white_png(12, 6), Some("bream.png".into()))
            .await
            .unwrap();
        assert_eq!(upload.details.width, 12);
        assert_eq!(upload.file_name.as_deref(), Some("bream.png"));

        assert!(matches!(
            Upload::decode_blocking(b"GIF89a".to_vec(), None).await,
            Err(Error::UnsupportedFormat)
        ));
    }

    #[test]
    fn stretch_normalizes_every_pixel() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 10, Rgb([255, 255, 255])));
        let tensor = Preprocessor::new(16, ResizeMode::Stretch).tensor(&image);

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        for c in 0..3 {
            let expected = (1.0 - MEAN[c]) / STD[c];
            assert_relative_eq!(tensor[[0, c, 0, 0]], expected, epsilon = 1e-5);
            assert_relative_eq!(tensor[[0, c, 15, 15]], expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn letterbox_pads_with_black() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 8, Rgb([255, 255, 255])));
        let tensor = Preprocessor::new(16, ResizeMode::Letterbox).tensor(&image);

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        // 32x8 fits as 16x4, centred vertically at rows 6..10.
        for c in 0..3 {
            assert_relative_eq!(tensor[[0, c, 0, 0]], -MEAN[c] / STD[c], epsilon = 1e-5);
            assert_relative_eq!(tensor[[0, c, 8, 8]], (1.0 - MEAN[c]) / STD[c], epsilon = 1e-5);
        }
    }
}
