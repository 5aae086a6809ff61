use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use uuid::Uuid;

/// Formats a phone camera or gallery picker produces.
const ACCEPTED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// Header-level facts about an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Upload checks that run before anything is persisted.
#[derive(Debug, Clone)]
pub struct Ingress {
    max_image_bytes: usize,
}

impl Ingress {
    pub fn new(max_image_bytes: usize) -> Self {
        Self { max_image_bytes }
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Check size and format, reading only the image header.
    pub fn validate_image(&self, bytes: &[u8]) -> Result<ImageInfo, IngressError> {
        if bytes.is_empty() {
            return Err(IngressError::Empty);
        }
        if bytes.len() > self.max_image_bytes {
            return Err(IngressError::TooLarge {
                size: bytes.len(),
                max: self.max_image_bytes,
            });
        }

        let format = image::guess_format(bytes).map_err(|_| IngressError::UnsupportedFormat)?;
        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(IngressError::UnsupportedFormat);
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| IngressError::Undecodable(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(IngressError::Undecodable("image has no pixels".to_string()));
        }

        Ok(ImageInfo {
            format,
            width,
            height,
        })
    }

    /// Parse a client-supplied request id, or mint one.
    pub fn request_id(&self, supplied: Option<&str>) -> Result<Uuid, IngressError> {
        match supplied.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                Uuid::parse_str(raw).map_err(|_| IngressError::InvalidRequestId(raw.to_string()))
            }
            None => Ok(Uuid::new_v4()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngressError {
    #[error("Image is empty")]
    Empty,

    #[error("Image is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported image format, expected JPEG, PNG or WebP")]
    UnsupportedFormat,

    #[error("Image header could not be decoded: {0}")]
    Undecodable(String),

    #[error("Invalid request id {0:?}, expected a UUID")]
    InvalidRequestId(String),

    #[error("Missing multipart field {0:?}")]
    MissingField(&'static str),

    #[error("Malformed multipart body: {0}")]
    Multipart(String),
}
