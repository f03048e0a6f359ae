//! Core types for image payloads and generation requests.

use crate::error::{CartoonifyError, Result};
use base64::Engine;
use std::path::Path;

/// Separator between metadata and payload in an encoded image.
pub const DATA_URL_SEPARATOR: &str = ";base64,";

/// Instruction sent alongside every source image.
pub const CARTOON_PROMPT: &str =
    "Transform this photo into a vibrant, polished 3D animated movie style cartoon portrait.";

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// An image as a MIME type plus raw bytes.
///
/// Both the user's source photo and the model's output use this shape. The
/// textual form is a data URL, `data:<mime>;base64,<payload>`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

impl EncodedImage {
    /// Creates an image from a MIME type and raw bytes.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Creates an image from raw bytes, guessing the MIME type from magic bytes
    /// and then the file name. Falls back to `image/png`.
    pub fn from_bytes(data: Vec<u8>, file_name: Option<&Path>) -> Self {
        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                file_name
                    .and_then(|p| p.extension())
                    .and_then(|e| e.to_str())
                    .and_then(ImageFormat::from_extension)
            })
            .unwrap_or_default();
        Self::new(format.mime_type(), data)
    }

    /// Reads an image file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(data, Some(path)))
    }

    /// Parses a `data:<mime>;base64,<payload>` string.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let (header, payload) = url
            .split_once(DATA_URL_SEPARATOR)
            .ok_or_else(|| CartoonifyError::InvalidDataUrl("Invalid image data URL format.".into()))?;

        let mime_type = header.strip_prefix("data:").unwrap_or(header).trim();
        if mime_type.is_empty() {
            return Err(CartoonifyError::InvalidDataUrl(
                "Image data URL is missing a MIME type.".into(),
            ));
        }

        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| CartoonifyError::Decode(e.to_string()))?;

        Ok(Self::new(mime_type, data))
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{}{}{}", self.mime_type, DATA_URL_SEPARATOR, self.to_base64())
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// A request to restyle an image.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Instruction text sent with the image.
    pub prompt: String,
    /// Image to restyle.
    pub input_image: EncodedImage,
}

impl GenerationRequest {
    /// Creates the cartoon portrait request for the given source image.
    pub fn cartoon(input_image: EncodedImage) -> Self {
        Self {
            prompt: CARTOON_PROMPT.to_string(),
            input_image,
        }
    }
}
