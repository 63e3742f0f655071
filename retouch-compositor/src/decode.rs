//! Result-image decoding and fitting.
//!
//! Generated results arrive as encoded bytes or `data:` URIs; both decode to
//! an RGBA raster which is then resampled to the canvas if needed.

use std::io::Cursor;

use base64::Engine;
use image::imageops::FilterType;
use image::RgbaImage;

use crate::error::{CompositeError, CompositeResult};

/// Encoded image formats recognized by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            Self::Png
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::WebP
        } else {
            Self::Unknown
        }
    }
}

/// Decode encoded image bytes into RGBA.
///
/// # Errors
///
/// Returns [`CompositeError::Decode`] if the bytes are not a supported image.
pub fn decode_bytes(data: &[u8]) -> CompositeResult<RgbaImage> {
    if ImageFormat::from_magic_bytes(data) == ImageFormat::Unknown {
        return Err(CompositeError::Decode("unrecognized image format".to_string()));
    }
    let img = image::load_from_memory(data).map_err(|e| CompositeError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Decode a `data:` URI such as `data:image/png;base64,iVBORw0KGgo...`.
///
/// # Errors
///
/// Returns [`CompositeError::Decode`] if the URI is malformed or its payload
/// is not a supported image.
pub fn decode_data_uri(uri: &str) -> CompositeResult<RgbaImage> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CompositeError::Decode("not a data URI".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| CompositeError::Decode("invalid data URI: missing comma".to_string()))?;

    let mime = metadata.split(';').next().unwrap_or_default();
    if !mime.is_empty() && ImageFormat::from_mime(mime) == ImageFormat::Unknown {
        return Err(CompositeError::Decode(format!("unsupported media type '{mime}'")));
    }

    let bytes = if metadata.split(';').any(|part| part == "base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| CompositeError::Decode(format!("bad base64: {e}")))?
    } else {
        percent_decode(payload)?
    };
    decode_bytes(&bytes)
}

fn percent_decode(input: &str) -> CompositeResult<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| CompositeError::Decode("invalid URL encoding".to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Resample `img` to exactly `width` x `height`.
///
/// Returns the input unchanged when it already has that size.
#[must_use]
pub fn fit_to_canvas(img: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    tracing::debug!(
        "Resampling {}x{} result to {width}x{height}",
        img.width(),
        img.height()
    );
    image::imageops::resize(&img, width, height, FilterType::Lanczos3)
}

/// Encode a raster as PNG.
///
/// # Errors
///
/// Returns [`CompositeError::Encode`] if encoding fails.
pub fn encode_png(img: &RgbaImage) -> CompositeResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| CompositeError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Encode a raster as a base64 PNG data URI.
///
/// # Errors
///
/// Returns [`CompositeError::Encode`] if encoding fails.
pub fn to_data_uri(img: &RgbaImage) -> CompositeResult<String> {
    let bytes = encode_png(img)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(4, 3, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x * 60) as u8, (y * 80) as u8, 100, 255])
        })
    }

    #[test]
    fn test_format_detection_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            ImageFormat::Png
        );
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\x00\x00\x00\x00WEBP"), ImageFormat::WebP);
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF8"), ImageFormat::Unknown);
    }

    #[test]
    fn test_png_bytes_decode_losslessly() {
        let img = sample();
        let decoded = decode_bytes(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_data_uri_decodes() {
        let img = sample();
        let uri = to_data_uri(&img).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap(), img);
    }

    #[test]
    fn test_malformed_data_uris() {
        assert!(decode_data_uri("https://example.com/a.png").is_err());
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:image/png;base64,!!!").is_err());
        assert!(decode_data_uri("data:text/plain;base64,aGVsbG8=").is_err());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(decode_bytes(b"not an image"), Err(CompositeError::Decode(_))));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b").unwrap(), b"a b");
        assert!(percent_decode("%zz").is_err());
    }

    #[test]
    fn test_fit_to_canvas() {
        let img = sample();
        assert_eq!(fit_to_canvas(img.clone(), 4, 3), img);
        assert_eq!(fit_to_canvas(img, 8, 6).dimensions(), (8, 6));
    }
}
