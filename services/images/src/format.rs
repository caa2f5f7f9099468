use crate::error::ImageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized image file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    Jpg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Map a request `Content-Type` to a format
    ///
    /// Media type parameters (`; charset=...`) are ignored and matching is
    /// case-insensitive. Anything not listed is rejected.
    pub fn from_content_type(content_type: &str) -> Result<Self, ImageError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpg),
            "image/png" => Ok(ImageFormat::Png),
            "image/gif" => Ok(ImageFormat::Gif),
            "image/webp" => Ok(ImageFormat::Webp),
            _ => Err(ImageError::UnsupportedFormat(content_type.to_string())),
        }
    }

    /// Uppercase tag stored in the metadata record
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "JPG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Webp => "WEBP",
        }
    }

    /// Lowercase file extension used in storage keys
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// Content type attached to the stored blob
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JPG" | "JPEG" => Ok(ImageFormat::Jpg),
            "PNG" => Ok(ImageFormat::Png),
            "GIF" => Ok(ImageFormat::Gif),
            "WEBP" => Ok(ImageFormat::Webp),
            _ => Err(ImageError::UnsupportedFormat(s.to_string())),
        }
    }
}
