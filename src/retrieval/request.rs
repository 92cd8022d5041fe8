//! Download request and expected format types.

use url::Url;

use super::error::RetrievalError;

/// Leading bytes of every PDF document (`%PDF`).
pub const PDF_MAGIC: [u8; 4] = [0x25, 0x50, 0x44, 0x46];

/// Leading bytes of a PNG image.
pub const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Leading bytes of a ZIP archive (local file header).
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Expected file format: leading magic bytes plus the content type servers
/// are expected to declare for it.
///
/// Only ever read. The declared content type doubles as the `Accept` header
/// of the verified fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSignature {
    name: String,
    magic: Vec<u8>,
    content_type: String,
}

impl FormatSignature {
    /// Creates a signature from a display name, magic bytes and MIME type.
    ///
    /// An empty `magic` matches every buffer.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        magic: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            magic: magic.into(),
            content_type: content_type.into().trim().to_ascii_lowercase(),
        }
    }

    /// PDF document signature (`%PDF`, `application/pdf`).
    #[must_use]
    pub fn pdf() -> Self {
        Self::new("PDF", PDF_MAGIC, "application/pdf")
    }

    /// PNG image signature.
    #[must_use]
    pub fn png() -> Self {
        Self::new("PNG", PNG_MAGIC, "image/png")
    }

    /// ZIP archive signature.
    #[must_use]
    pub fn zip() -> Self {
        Self::new("ZIP", ZIP_MAGIC, "application/zip")
    }

    /// Looks up a built-in signature by its lowercase name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::pdf()),
            "png" => Some(Self::png()),
            "zip" => Some(Self::zip()),
            _ => None,
        }
    }

    /// Display name of the format.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected leading bytes.
    #[must_use]
    pub fn magic(&self) -> &[u8] {
        &self.magic
    }

    /// Declared MIME type, lowercased.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Subtype token used for lenient label matching (`pdf` for
    /// `application/pdf`). Empty when the content type has no subtype.
    #[must_use]
    pub fn subtype_token(&self) -> &str {
        self.content_type
            .split_once('/')
            .map_or("", |(_, subtype)| subtype.trim())
    }
}

/// A single request to deliver `source_location` as `target_file_name`.
///
/// Immutable once built: fields are private and only exposed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    source_location: String,
    target_file_name: String,
    expected_format: FormatSignature,
}

impl DownloadRequest {
    /// Creates a request.
    ///
    /// `source_location` may be absolute or relative to the retriever origin.
    #[must_use]
    pub fn new(
        source_location: impl Into<String>,
        target_file_name: impl Into<String>,
        expected_format: FormatSignature,
    ) -> Self {
        Self {
            source_location: source_location.into(),
            target_file_name: target_file_name.into(),
            expected_format,
        }
    }

    /// Convenience constructor for a PDF request.
    #[must_use]
    pub fn pdf(source_location: impl Into<String>, target_file_name: impl Into<String>) -> Self {
        Self::new(source_location, target_file_name, FormatSignature::pdf())
    }

    /// Raw source location as submitted.
    #[must_use]
    pub fn source_location(&self) -> &str {
        &self.source_location
    }

    /// File name the download should be saved as.
    #[must_use]
    pub fn target_file_name(&self) -> &str {
        &self.target_file_name
    }

    /// Format the fetched bytes must match.
    #[must_use]
    pub fn expected_format(&self) -> &FormatSignature {
        &self.expected_format
    }

    /// Resolves the source location to an absolute URL.
    ///
    /// Absolute locations are used as-is; relative ones are joined onto
    /// `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidLocation`] when the location is not a
    /// valid absolute URL and cannot be joined onto `origin` (or no origin is
    /// configured).
    pub fn resolve(&self, origin: Option<&Url>) -> Result<Url, RetrievalError> {
        let raw = self.source_location.trim();
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => origin
                .and_then(|base| base.join(raw).ok())
                .ok_or_else(|| RetrievalError::invalid_location(raw)),
            Err(_) => Err(RetrievalError::invalid_location(raw)),
        }
    }
}
